//! Command router
//!
//! The single entry point for the frontend. Turns intents into manager calls,
//! tracks which agent is active and answers every intent with a reply; it
//! never fails outright. Failures become a `Failed` reply plus a diagnostic on
//! the event bus.

use crate::agent::AgentManager;
use crate::error::{AgentError, Error, Result};
use crate::types::*;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// What the user asked for, independent of phrasing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// `None` targets the active agent
    Start(Option<String>),
    StartAll,
    Stop(Option<String>),
    StopAll,
    Switch(String),
    Rescan,
    /// Free text for the active agent
    Send(String),
    /// One-shot run of the active agent with the text as prompt
    RunOnce(String),
    Help,
}

/// Outcome of one intent
#[derive(Debug, Clone)]
pub enum RouterReply {
    Started(AgentRuntimeState),
    /// `start` on a live agent: nothing spawned
    AlreadyRunning(AgentRuntimeState),
    StartedAll {
        started: Vec<String>,
        failed: Vec<String>,
    },
    Stopped(String),
    /// `stop` on an agent without a process: nothing done
    NotRunning(String),
    StoppedAll(Vec<String>),
    Switched(String),
    Rescanned {
        agents: Vec<AgentInfo>,
        active: Option<String>,
    },
    Sent(String),
    Finished {
        agent_id: String,
        exit_code: Option<i32>,
    },
    Help,
    Failed(String),
}

const HELP: &str = "\
start [id|all]     start the active agent, a named one, or every idle agent
stop [id|all]      stop the active agent, a named one, or every running agent
switch <id>        make <id> the target of unqualified commands
rescan             look for installed agents again
run <prompt>       one-shot run of the active agent
help               show this text
anything else is sent to the active agent";

impl fmt::Display for RouterReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterReply::Started(state) => match state.pid {
                Some(pid) => write!(f, "{} started (pid {})", state.agent_id, pid),
                None => write!(f, "{} started", state.agent_id),
            },
            RouterReply::AlreadyRunning(state) => {
                write!(f, "{} is already {}", state.agent_id, state.status)
            }
            RouterReply::StartedAll { started, failed } => {
                write!(f, "started: {}", list_or_none(started))?;
                if !failed.is_empty() {
                    write!(f, "; failed: {}", failed.join(", "))?;
                }
                Ok(())
            }
            RouterReply::Stopped(id) => write!(f, "{} stopped", id),
            RouterReply::NotRunning(id) => write!(f, "{} is not running", id),
            RouterReply::StoppedAll(ids) => write!(f, "stopped: {}", list_or_none(ids)),
            RouterReply::Switched(id) => write!(f, "active agent: {}", id),
            RouterReply::Rescanned { agents, active } => {
                writeln!(f, "{} agent(s):", agents.len())?;
                for info in agents {
                    let marker = if active.as_deref() == Some(info.descriptor.id.as_str()) {
                        '*'
                    } else {
                        ' '
                    };
                    writeln!(
                        f,
                        "{} {:<14} {:<12} {}",
                        marker,
                        info.descriptor.id,
                        info.state.status,
                        info.descriptor.version.as_deref().unwrap_or("-")
                    )?;
                }
                Ok(())
            }
            RouterReply::Sent(id) => write!(f, "-> {}", id),
            RouterReply::Finished {
                agent_id,
                exit_code,
            } => match exit_code {
                Some(code) => write!(f, "{} finished (exit {})", agent_id, code),
                None => write!(f, "{} finished", agent_id),
            },
            RouterReply::Help => f.write_str(HELP),
            RouterReply::Failed(message) => write!(f, "error: {}", message),
        }
    }
}

fn list_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}

/// Dispatches intents against an `AgentManager`
pub struct CommandRouter {
    manager: Arc<AgentManager>,
    active: RwLock<Option<String>>,
}

impl CommandRouter {
    pub fn new(manager: Arc<AgentManager>) -> Self {
        Self {
            manager,
            active: RwLock::new(None),
        }
    }

    pub fn manager(&self) -> &Arc<AgentManager> {
        &self.manager
    }

    pub fn active(&self) -> Option<String> {
        self.active.read().clone()
    }

    /// Discover agents, load user-added ones and pick an active agent
    pub async fn bootstrap(&self) -> RouterReply {
        let reply = self.dispatch(Intent::Rescan).await;
        self.manager.load_custom_agents().await;
        self.ensure_active();
        reply
    }

    pub async fn dispatch(&self, intent: Intent) -> RouterReply {
        debug!("Dispatching {:?}", intent);
        let result = match intent {
            Intent::Start(target) => self.start(target),
            Intent::StartAll => Ok(self.start_all()),
            Intent::Stop(target) => self.stop(target).await,
            Intent::StopAll => Ok(self.stop_all().await),
            Intent::Switch(id) => self.switch(id),
            Intent::Rescan => Ok(self.rescan().await),
            Intent::Send(text) => return self.send(&text).await,
            Intent::RunOnce(prompt) => self.run_once(&prompt).await,
            Intent::Help => Ok(RouterReply::Help),
        };
        result.unwrap_or_else(|e| self.fail(e))
    }

    fn fail(&self, error: Error) -> RouterReply {
        if !error.already_reported() {
            self.manager.report(error.agent_id(), error.to_string());
        }
        RouterReply::Failed(error.to_string())
    }

    fn resolve(&self, target: Option<String>) -> Result<String> {
        let id = match target {
            Some(id) => id,
            None => self
                .active()
                .ok_or(Error::Agent(AgentError::NoActiveAgent))?,
        };
        if self.manager.descriptor(&id).is_none() {
            return Err(Error::Agent(AgentError::NotFound(id)));
        }
        Ok(id)
    }

    /// Keep the active agent if still known, else pick the first usable one
    fn ensure_active(&self) {
        let mut active = self.active.write();
        if active
            .as_deref()
            .is_some_and(|id| self.manager.descriptor(id).is_some())
        {
            return;
        }
        *active = self
            .manager
            .list_agents()
            .into_iter()
            .find(|info| info.state.status != AgentStatus::Unavailable)
            .map(|info| info.descriptor.id);
        if let Some(id) = active.as_deref() {
            info!("Active agent: {}", id);
        }
    }

    fn start(&self, target: Option<String>) -> Result<RouterReply> {
        let id = self.resolve(target)?;
        match self.manager.state(&id) {
            Some(state) if state.status.is_live() => Ok(RouterReply::AlreadyRunning(state)),
            _ => self.manager.start(&id).map(RouterReply::Started),
        }
    }

    fn start_all(&self) -> RouterReply {
        let mut started = Vec::new();
        let mut failed = Vec::new();
        for info in self.manager.list_agents() {
            if !matches!(info.state.status, AgentStatus::Offline | AgentStatus::Error) {
                continue;
            }
            let id = info.descriptor.id;
            match self.manager.start(&id) {
                Ok(_) => started.push(id),
                Err(e) => {
                    if !e.already_reported() {
                        self.manager.report(Some(&id), e.to_string());
                    }
                    failed.push(id);
                }
            }
        }
        RouterReply::StartedAll { started, failed }
    }

    async fn stop(&self, target: Option<String>) -> Result<RouterReply> {
        let id = self.resolve(target)?;
        if !self.manager.is_running(&id) {
            return Ok(RouterReply::NotRunning(id));
        }
        self.manager.stop(&id).await?;
        Ok(RouterReply::Stopped(id))
    }

    async fn stop_all(&self) -> RouterReply {
        let ids = self.manager.running_agents();
        self.manager.stop_all().await;
        RouterReply::StoppedAll(ids)
    }

    fn switch(&self, id: String) -> Result<RouterReply> {
        let id = self.resolve(Some(id))?;
        *self.active.write() = Some(id.clone());
        info!("Switched active agent to {}", id);
        Ok(RouterReply::Switched(id))
    }

    async fn rescan(&self) -> RouterReply {
        self.manager.discover().await;
        self.ensure_active();
        RouterReply::Rescanned {
            agents: self.manager.list_agents(),
            active: self.active(),
        }
    }

    async fn send(&self, text: &str) -> RouterReply {
        let id = match self.resolve(None) {
            Ok(id) => id,
            Err(e) => return self.fail(e),
        };

        if self.manager.config().default_mode == LaunchMode::OneShot {
            return self
                .run_once(text)
                .await
                .unwrap_or_else(|e| self.fail(e));
        }

        if self.manager.status(&id) == Some(AgentStatus::Offline) {
            info!("Auto-starting {} for input", id);
            if let Err(e) = self.manager.start(&id) {
                return self.fail(e);
            }
        }

        // The manager reports its own send failures
        match self.manager.send(&id, text).await {
            Ok(()) => RouterReply::Sent(id),
            Err(e) => RouterReply::Failed(e.to_string()),
        }
    }

    async fn run_once(&self, prompt: &str) -> Result<RouterReply> {
        let id = self.resolve(None)?;
        let exit_code = self.manager.run_once(&id, prompt).await?;
        Ok(RouterReply::Finished {
            agent_id: id,
            exit_code,
        })
    }
}
