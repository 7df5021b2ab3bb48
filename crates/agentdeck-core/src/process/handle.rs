//! Ownership of one live agent process

use super::signal;
use crate::error::{AgentError, Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, trace};

/// How a process lifetime ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExitOutcome {
    pub code: Option<i32>,
}

/// Supervisor-owned record of a live process
///
/// The `Child` itself belongs to the exit watcher; this holds the stdin writer
/// and the levers to stop it. Removed by the watcher once exit is recorded.
pub(crate) struct ProcessHandle {
    /// Distinguishes lifetimes of the same agent id
    pub instance: u64,
    pub control: ProcessControl,
}

/// Levers over a live process, usable without holding the handle table lock
#[derive(Clone)]
pub(crate) struct ProcessControl {
    agent_id: String,
    pid: Option<u32>,
    /// `None` once closed; the mutex serializes writers
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    kill: Arc<Notify>,
    /// Set by the watcher as soon as the OS reports exit; the pid may be reused after
    reaped: Arc<AtomicBool>,
    exited: watch::Receiver<Option<ExitOutcome>>,
}

impl ProcessControl {
    pub fn new(
        agent_id: impl Into<String>,
        pid: Option<u32>,
        stdin: Option<ChildStdin>,
        exited: watch::Receiver<Option<ExitOutcome>>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            pid,
            stdin: Arc::new(Mutex::new(stdin)),
            kill: Arc::new(Notify::new()),
            reaped: Arc::new(AtomicBool::new(false)),
            exited,
        }
    }

    /// Write `text` plus a newline as one write
    pub async fn write_line(&self, text: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| Error::Agent(AgentError::NotRunning(self.agent_id.clone())))?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        trace!("Sending to agent {}: {}", self.agent_id, text);
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            // The pipe is unusable from here on
            *guard = None;
            return Err(match e.kind() {
                std::io::ErrorKind::BrokenPipe => {
                    debug!("Agent {} stdin closed: {}", self.agent_id, e);
                    Error::Agent(AgentError::NotRunning(self.agent_id.clone()))
                }
                _ => Error::Io(e),
            });
        }
        Ok(())
    }

    /// Close stdin unless a write is in flight
    pub fn close_stdin(&self) {
        match self.stdin.try_lock() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    debug!("Closed stdin of agent {}", self.agent_id);
                }
            }
            Err(_) => debug!("Agent {} stdin busy, relying on signal", self.agent_id),
        }
    }

    /// Record that the process is gone; signals are no longer sent to its pid
    pub fn mark_reaped(&self) {
        self.reaped.store(true, Ordering::Release);
    }

    pub fn is_reaped(&self) -> bool {
        self.reaped.load(Ordering::Acquire)
    }

    pub fn request_terminate(&self) {
        if self.is_reaped() {
            debug!("Agent {} already exited, not signalling", self.agent_id);
            return;
        }
        if let Some(pid) = self.pid {
            signal::request_terminate(pid);
        }
    }

    pub fn force_kill(&self) {
        if !self.is_reaped() {
            self.kill.notify_one();
        }
    }

    /// Resolves once `force_kill` has been called
    pub async fn kill_requested(&self) {
        self.kill.notified().await
    }

    /// Resolves once the watcher has recorded the exit
    pub async fn wait_exit(&self) -> Option<ExitOutcome> {
        let mut exited = self.exited.clone();
        let outcome = match exited.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => *outcome,
            // Watcher gone without recording: treat as unknown exit
            Err(_) => None,
        };
        outcome
    }
}
