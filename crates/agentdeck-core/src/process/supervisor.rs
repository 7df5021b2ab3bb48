//! Process supervisor: spawn, pump, write, stop and reap agent processes

use super::handle::{ExitOutcome, ProcessControl, ProcessHandle};
use super::output::{pump_stream, OutputEmitter};
use super::registry::ProcessRegistry;
use crate::config::ManagerConfig;
use crate::error::{AgentError, Error, Result};
use crate::events::EventBus;
use crate::types::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Timing knobs for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub stop_grace: Duration,
    pub output_drain: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&ManagerConfig::default())
    }
}

impl From<&ManagerConfig> for SupervisorSettings {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            stop_grace: config.stop_grace(),
            output_drain: config.output_drain(),
        }
    }
}

/// Owns every live agent process
///
/// Per agent id there is at most one `ProcessHandle`. Each live process gets
/// a stdout loop, a stderr loop and an exit watcher as separate tasks; the
/// watcher alone records terminal state.
#[derive(Clone)]
pub struct ProcessSupervisor {
    registry: Arc<ProcessRegistry>,
    bus: Arc<EventBus>,
    handles: Arc<Mutex<HashMap<String, ProcessHandle>>>,
    emitters: Arc<Mutex<HashMap<String, Arc<OutputEmitter>>>>,
    next_instance: Arc<AtomicU64>,
    settings: SupervisorSettings,
}

impl ProcessSupervisor {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        bus: Arc<EventBus>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            registry,
            bus,
            handles: Arc::new(Mutex::new(HashMap::new())),
            emitters: Arc::new(Mutex::new(HashMap::new())),
            next_instance: Arc::new(AtomicU64::new(0)),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Record an agent's availability from its verification result
    ///
    /// A new agent starts `offline` or `unavailable`. An existing record is
    /// kept as is, except that `offline` and `unavailable` follow the latest
    /// verification; status history such as `error` and the last exit code
    /// survive a rescan.
    pub fn register(&self, id: &str, available: bool) {
        let _handles = self.handles.lock();
        let Some(mut state) = self.registry.get(id) else {
            let status = if available {
                AgentStatus::Offline
            } else {
                AgentStatus::Unavailable
            };
            self.registry
                .upsert(id, AgentRuntimeState::with_status(id, status));
            return;
        };

        let next = match (state.status, available) {
            (AgentStatus::Unavailable, true) => AgentStatus::Offline,
            (AgentStatus::Offline, false) => AgentStatus::Unavailable,
            (status, _) => {
                debug!("Agent {} keeps its {} state", id, status);
                return;
            }
        };
        info!("Agent {} is now {}", id, next);
        state.status = next;
        self.registry.upsert(id, state);
    }

    /// Forget an agent that has no live process
    pub fn unregister(&self, id: &str) -> Result<()> {
        let handles = self.handles.lock();
        if handles.contains_key(id) {
            return Err(Error::Agent(AgentError::StillRunning(id.to_string())));
        }
        self.registry
            .remove(id)
            .ok_or_else(|| Error::Agent(AgentError::NotFound(id.to_string())))?;
        self.emitters.lock().remove(id);
        Ok(())
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.handles.lock().contains_key(id)
    }

    pub fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start a long-lived session process
    pub fn spawn(&self, descriptor: &AgentDescriptor) -> Result<AgentRuntimeState> {
        let (state, _) = self.launch(descriptor, &descriptor.launch_args, LaunchMode::Session)?;
        Ok(state)
    }

    /// Run the agent with `prompt` as its last argument and wait for it to finish
    ///
    /// Output streams exactly as in session mode. Returns the exit code; a
    /// non-zero code is an `AbnormalExit`.
    pub async fn run_once(
        &self,
        descriptor: &AgentDescriptor,
        prompt: &str,
    ) -> Result<Option<i32>> {
        let mut args = descriptor.launch_args.clone();
        args.push(prompt.to_string());

        let (_, control) = self.launch(descriptor, &args, LaunchMode::OneShot)?;
        let code = control.wait_exit().await.and_then(|outcome| outcome.code);

        match code {
            None | Some(0) => Ok(code),
            Some(code) => Err(Error::Agent(AgentError::AbnormalExit {
                id: descriptor.id.clone(),
                code,
            })),
        }
    }

    /// Write `text` and a newline to the agent's stdin
    pub async fn send(&self, id: &str, text: &str) -> Result<()> {
        let control = self
            .control(id)
            .ok_or_else(|| Error::Agent(AgentError::NotRunning(id.to_string())))?;
        control.write_line(text).await
    }

    /// Ask the process to exit, force-kill after the grace period
    ///
    /// Stopping an agent with no live process succeeds without side effects.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let control = match self.control(id) {
            Some(control) => control,
            None => {
                debug!("Agent {} not running, nothing to stop", id);
                return Ok(());
            }
        };

        info!("Stopping agent: {}", id);
        control.close_stdin();
        control.request_terminate();

        let grace = self.settings.stop_grace;
        if tokio::time::timeout(grace, control.wait_exit()).await.is_err() {
            warn!("Agent {} still alive after {:?}, killing", id, grace);
            control.force_kill();
            control.wait_exit().await;
        }

        info!("Agent stopped: {}", id);
        Ok(())
    }

    /// Stop every live agent concurrently
    pub async fn stop_all(&self) {
        let ids = self.running_ids();
        let stops = ids.iter().map(|id| self.stop(id));
        for (id, result) in ids.iter().zip(futures::future::join_all(stops).await) {
            if let Err(e) = result {
                error!("Error stopping agent {}: {}", id, e);
            }
        }
    }

    fn control(&self, id: &str) -> Option<ProcessControl> {
        self.handles.lock().get(id).map(|h| h.control.clone())
    }

    fn emitter_for(&self, id: &str) -> Arc<OutputEmitter> {
        let mut emitters = self.emitters.lock();
        Arc::clone(
            emitters
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(OutputEmitter::new(id, Arc::clone(&self.bus)))),
        )
    }

    fn advance(state: &mut AgentRuntimeState, next: AgentStatus) -> Result<()> {
        if !state.status.can_transition_to(next) {
            return Err(Error::Agent(AgentError::InvalidTransition {
                id: state.agent_id.clone(),
                from: state.status,
                to: next,
            }));
        }
        state.status = next;
        Ok(())
    }

    fn launch(
        &self,
        descriptor: &AgentDescriptor,
        args: &[String],
        mode: LaunchMode,
    ) -> Result<(AgentRuntimeState, ProcessControl)> {
        let id = descriptor.id.as_str();
        let mut handles = self.handles.lock();

        if handles.contains_key(id) {
            return Err(Error::Agent(AgentError::AlreadyRunning(id.to_string())));
        }

        let mut state = self
            .registry
            .get(id)
            .unwrap_or_else(|| AgentRuntimeState::new(id));
        if state.status == AgentStatus::Unavailable {
            return Err(Error::Agent(AgentError::Unavailable(id.to_string())));
        }

        Self::advance(&mut state, AgentStatus::Starting)?;
        state.pid = None;
        self.registry.upsert(id, state.clone());

        info!(
            "Starting agent {} ({} {:?}, {:?} mode)",
            id, descriptor.launch_command, args, mode
        );

        let mut child = match build_command(&descriptor.launch_command, args, mode).spawn() {
            Ok(child) => child,
            Err(e) => {
                state.status = AgentStatus::Error;
                self.registry.upsert(id, state);
                drop(handles);

                let failure = AgentError::SpawnFailure {
                    id: id.to_string(),
                    reason: format!("'{}': {}", descriptor.launch_command, e),
                };
                warn!("{}", failure);
                self.bus
                    .publish(AgentEvent::error(Some(id), failure.to_string()));
                return Err(Error::Agent(failure));
            }
        };

        let pid = child.id();
        let emitter = self.emitter_for(id);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_stream(
                stdout,
                OutputStream::Stdout,
                Arc::clone(&emitter),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_stream(
                stderr,
                OutputStream::Stderr,
                Arc::clone(&emitter),
            )));
        }

        let (exited_tx, exited_rx) = watch::channel(None);
        let control = ProcessControl::new(id, pid, child.stdin.take(), exited_rx);
        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);

        Self::advance(&mut state, AgentStatus::Running)?;
        state.pid = pid;
        state.started_at = Some(chrono::Utc::now());
        state.last_exit_code = None;
        self.registry.upsert(id, state.clone());
        handles.insert(
            id.to_string(),
            ProcessHandle {
                instance,
                control: control.clone(),
            },
        );
        drop(handles);

        info!("Agent started: {} (pid {:?})", id, pid);
        tokio::spawn(self.clone().watch_exit(
            id.to_string(),
            instance,
            child,
            control.clone(),
            readers,
            exited_tx,
        ));

        Ok((state, control))
    }

    /// Block until the process exits, then record it and release the handle
    ///
    /// Terminal state is recorded as soon as the process is reaped; the exit
    /// event follows once the output readers are drained.
    async fn watch_exit(
        self,
        id: String,
        instance: u64,
        mut child: Child,
        control: ProcessControl,
        readers: Vec<JoinHandle<()>>,
        exited_tx: watch::Sender<Option<ExitOutcome>>,
    ) {
        let status = tokio::select! {
            status = child.wait() => status,
            _ = control.kill_requested() => {
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill agent {}: {}", id, e);
                }
                child.wait().await
            }
        };
        control.mark_reaped();

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                error!("Failed to wait for agent {}: {}", id, e);
                None
            }
        };

        let clean = matches!(exit_code, None | Some(0));
        {
            let mut handles = self.handles.lock();
            if handles.get(&id).is_some_and(|h| h.instance == instance) {
                handles.remove(&id);
            }

            let mut state = self
                .registry
                .get(&id)
                .unwrap_or_else(|| AgentRuntimeState::with_status(&id, AgentStatus::Running));
            let next = if clean {
                AgentStatus::Offline
            } else {
                AgentStatus::Error
            };
            if let Err(e) = Self::advance(&mut state, next) {
                warn!("{}", e);
                state.status = next;
            }
            state.pid = None;
            state.last_exit_code = exit_code;
            self.registry.upsert(&id, state);
        }

        // All output of this lifetime goes out before the exit event
        for mut reader in readers {
            if tokio::time::timeout(self.settings.output_drain, &mut reader)
                .await
                .is_err()
            {
                warn!("Agent {} output still open after exit, detaching", id);
                reader.abort();
            }
        }

        if let Some(code) = exit_code.filter(|_| !clean) {
            let failure = AgentError::AbnormalExit {
                id: id.clone(),
                code,
            };
            warn!("{}", failure);
            self.bus
                .publish(AgentEvent::error(Some(&id), failure.to_string()));
        } else {
            info!("Agent {} exited (code {:?})", id, exit_code);
        }

        self.bus.publish(AgentEvent::Exit(ExitEvent {
            agent_id: id,
            exit_code,
        }));
        exited_tx.send_replace(Some(ExitOutcome { code: exit_code }));
    }
}

fn build_command(program: &str, args: &[String], mode: LaunchMode) -> Command {
    // npm installs shell wrappers that only cmd.exe can launch
    #[cfg(windows)]
    let mut cmd = if is_batch_wrapper(program) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/c").arg(program);
        cmd
    } else {
        Command::new(program)
    };

    #[cfg(not(windows))]
    let mut cmd = Command::new(program);

    let stdin = match mode {
        LaunchMode::Session => Stdio::piped(),
        LaunchMode::OneShot => Stdio::null(),
    };

    cmd.args(args)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

#[cfg(windows)]
fn is_batch_wrapper(program: &str) -> bool {
    let lower = program.to_ascii_lowercase();
    lower.ends_with(".cmd") || lower.ends_with(".bat")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::EventStream;
    use pretty_assertions::assert_eq;

    fn supervisor() -> (ProcessSupervisor, EventStream) {
        supervisor_draining(Duration::from_millis(500))
    }

    fn supervisor_draining(output_drain: Duration) -> (ProcessSupervisor, EventStream) {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        let settings = SupervisorSettings {
            stop_grace: Duration::from_millis(300),
            output_drain,
        };
        (
            ProcessSupervisor::new(Arc::new(ProcessRegistry::new()), bus, settings),
            events,
        )
    }

    fn sh(id: &str, script: &str) -> AgentDescriptor {
        AgentDescriptor::new(id, id, "sh").with_args(vec!["-c".to_string(), script.to_string()])
    }

    async fn next_event(events: &mut EventStream) -> AgentEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    /// Everything up to and including the agent's exit event
    async fn drain_lifetime(events: &mut EventStream, id: &str) -> Vec<AgentEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(events).await;
            let done = matches!(&event, AgentEvent::Exit(exit) if exit.agent_id == id);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_echo_scenario() {
        let (supervisor, mut events) = supervisor();
        let echo = AgentDescriptor::new("A", "A", "echo").with_args(vec!["hi".to_string()]);

        let state = supervisor.spawn(&echo).unwrap();
        assert_eq!(state.status, AgentStatus::Running);

        let seen = drain_lifetime(&mut events, "A").await;
        assert_eq!(
            seen,
            vec![
                AgentEvent::Output(OutputEvent {
                    agent_id: "A".to_string(),
                    stream: OutputStream::Stdout,
                    chunk: "hi\n".to_string(),
                    sequence: 0,
                }),
                AgentEvent::Exit(ExitEvent {
                    agent_id: "A".to_string(),
                    exit_code: Some(0),
                }),
            ]
        );

        let state = supervisor.registry().get("A").unwrap();
        assert_eq!(state.status, AgentStatus::Offline);
        assert_eq!(state.last_exit_code, Some(0));
        assert!(!supervisor.is_running("A"));
    }

    #[tokio::test]
    async fn test_missing_executable_scenario() {
        let (supervisor, mut events) = supervisor();
        let missing = AgentDescriptor::new("B", "B", "/no/such/bin");

        let result = supervisor.spawn(&missing);
        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::SpawnFailure { .. }))
        ));
        assert_eq!(supervisor.registry().status("B"), Some(AgentStatus::Error));
        assert!(!supervisor.is_running("B"));

        match next_event(&mut events).await {
            AgentEvent::Diagnostic(diag) => {
                assert_eq!(diag.agent_id.as_deref(), Some("B"));
                assert_eq!(diag.level, DiagnosticLevel::Error);
            }
            other => panic!("expected diagnostic, got {:?}", other),
        }
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_error_state_can_restart() {
        let (supervisor, mut events) = supervisor();
        supervisor
            .spawn(&AgentDescriptor::new("B", "B", "/no/such/bin"))
            .unwrap_err();
        next_event(&mut events).await;

        supervisor.spawn(&sh("B", "exit 0")).unwrap();
        drain_lifetime(&mut events, "B").await;
        assert_eq!(supervisor.registry().status("B"), Some(AgentStatus::Offline));
    }

    #[tokio::test]
    async fn test_send_to_offline_agent_fails() {
        let (supervisor, mut events) = supervisor();
        supervisor.register("idle", true);

        let result = supervisor.send("idle", "hello").await;
        assert!(matches!(result, Err(ref e) if e.is_not_running()));
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_session_round_trip_and_stop() {
        let (supervisor, mut events) = supervisor();
        supervisor.spawn(&AgentDescriptor::new("cat", "cat", "cat")).unwrap();

        supervisor.send("cat", "ping").await.unwrap();
        match next_event(&mut events).await {
            AgentEvent::Output(out) => assert_eq!(out.chunk, "ping\n"),
            other => panic!("expected output, got {:?}", other),
        }

        supervisor.stop("cat").await.unwrap();
        match next_event(&mut events).await {
            AgentEvent::Exit(exit) => assert!(exit.is_clean()),
            other => panic!("expected exit, got {:?}", other),
        }
        assert_eq!(supervisor.registry().status("cat"), Some(AgentStatus::Offline));

        let after = supervisor.send("cat", "again").await;
        assert!(matches!(after, Err(ref e) if e.is_not_running()));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (supervisor, mut events) = supervisor();
        supervisor.spawn(&sh("sleeper", "exec sleep 30")).unwrap();

        supervisor.stop("sleeper").await.unwrap();
        supervisor.stop("sleeper").await.unwrap();

        let seen = drain_lifetime(&mut events, "sleeper").await;
        assert_eq!(seen.len(), 1);
        assert!(events.try_recv().is_none());
        assert_eq!(
            supervisor.registry().status("sleeper"),
            Some(AgentStatus::Offline)
        );
    }

    #[tokio::test]
    async fn test_stop_on_offline_agent_is_silent() {
        let (supervisor, mut events) = supervisor();
        supervisor.register("idle", true);
        let before = supervisor.registry().get("idle");

        supervisor.stop("idle").await.unwrap();

        assert_eq!(supervisor.registry().get("idle"), before);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let (supervisor, mut events) = supervisor();
        supervisor
            .spawn(&sh("stubborn", "trap '' TERM; echo ready; exec sleep 30"))
            .unwrap();
        // SIGTERM must not land before the trap is installed
        assert!(matches!(next_event(&mut events).await, AgentEvent::Output(_)));

        let started = std::time::Instant::now();
        supervisor.stop("stubborn").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));

        match next_event(&mut events).await {
            AgentEvent::Exit(exit) => assert_eq!(exit.exit_code, None),
            other => panic!("expected exit, got {:?}", other),
        }
        assert_eq!(
            supervisor.registry().status("stubborn"),
            Some(AgentStatus::Offline)
        );
    }

    #[tokio::test]
    async fn test_abnormal_exit_reports_error() {
        let (supervisor, mut events) = supervisor();
        supervisor.spawn(&sh("bad", "echo oops >&2; exit 3")).unwrap();

        let seen = drain_lifetime(&mut events, "bad").await;
        assert!(matches!(
            &seen[0],
            AgentEvent::Output(out) if out.stream == OutputStream::Stderr && out.chunk == "oops\n"
        ));
        assert!(matches!(&seen[1], AgentEvent::Diagnostic(d) if d.message.contains("code 3")));
        assert_eq!(
            seen[2],
            AgentEvent::Exit(ExitEvent {
                agent_id: "bad".to_string(),
                exit_code: Some(3),
            })
        );

        let state = supervisor.registry().get("bad").unwrap();
        assert_eq!(state.status, AgentStatus::Error);
        assert_eq!(state.last_exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_sequences_are_gapless() {
        let (supervisor, mut events) = supervisor();
        supervisor
            .spawn(&sh(
                "chatty",
                "for i in 1 2 3 4 5; do echo out$i; echo err$i >&2; done",
            ))
            .unwrap();

        let seen = drain_lifetime(&mut events, "chatty").await;
        let sequences: Vec<u64> = seen
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Output(out) => Some(out.sequence),
                _ => None,
            })
            .collect();

        assert!(!sequences.is_empty());
        let expected: Vec<u64> = (0..sequences.len() as u64).collect();
        assert_eq!(sequences, expected);
        assert!(matches!(seen.last(), Some(AgentEvent::Exit(_))));
    }

    #[tokio::test]
    async fn test_run_once_appends_prompt() {
        let (supervisor, mut events) = supervisor();
        let echo = AgentDescriptor::new("once", "once", "echo");

        let code = supervisor.run_once(&echo, "hello world").await.unwrap();
        assert_eq!(code, Some(0));
        assert_eq!(supervisor.registry().status("once"), Some(AgentStatus::Offline));

        let seen = drain_lifetime(&mut events, "once").await;
        assert!(matches!(&seen[0], AgentEvent::Output(out) if out.chunk == "hello world\n"));
    }

    #[tokio::test]
    async fn test_run_once_nonzero_exit() {
        let (supervisor, _events) = supervisor();
        let failing = sh("once", "exit 2");

        let result = supervisor.run_once(&failing, "ignored").await;
        assert!(matches!(
            result,
            Err(Error::Agent(AgentError::AbnormalExit { code: 2, .. }))
        ));
        assert_eq!(supervisor.registry().status("once"), Some(AgentStatus::Error));
    }

    #[tokio::test]
    async fn test_unavailable_agent_cannot_start() {
        let (supervisor, mut events) = supervisor();
        supervisor.register("ghost", false);

        let result = supervisor.spawn(&AgentDescriptor::new("ghost", "Ghost", "echo"));
        assert!(matches!(result, Err(Error::Agent(AgentError::Unavailable(_)))));
        assert_eq!(
            supervisor.registry().status("ghost"),
            Some(AgentStatus::Unavailable)
        );
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_single_live_process_per_agent() {
        let (supervisor, _events) = supervisor();
        let sleeper = sh("one", "exec sleep 30");

        supervisor.spawn(&sleeper).unwrap();
        let second = supervisor.spawn(&sleeper);
        assert!(matches!(second, Err(Error::Agent(AgentError::AlreadyRunning(_)))));
        assert_eq!(supervisor.running_ids(), vec!["one".to_string()]);

        let unregister = supervisor.unregister("one");
        assert!(matches!(unregister, Err(Error::Agent(AgentError::StillRunning(_)))));

        supervisor.stop_all().await;
        assert!(supervisor.running_ids().is_empty());
        supervisor.unregister("one").unwrap();
        assert!(supervisor.registry().get("one").is_none());
    }

    #[tokio::test]
    async fn test_exit_recorded_while_output_still_open() {
        let (supervisor, mut events) = supervisor_draining(Duration::from_secs(2));
        // The backgrounded sleep inherits stdout and keeps it open
        supervisor.spawn(&sh("g", "sleep 5 & exit 0")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let state = supervisor.registry().get("g").unwrap();
        assert_eq!(state.status, AgentStatus::Offline);
        assert_eq!(state.pid, None);
        assert_eq!(state.last_exit_code, Some(0));
        assert!(!supervisor.is_running("g"));

        let started = std::time::Instant::now();
        supervisor.stop("g").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        supervisor.spawn(&sh("g", "exit 0")).unwrap();
        let mut exits = 0;
        while exits < 2 {
            if let AgentEvent::Exit(exit) = next_event(&mut events).await {
                assert_eq!(exit.agent_id, "g");
                exits += 1;
            }
        }
        assert_eq!(supervisor.registry().status("g"), Some(AgentStatus::Offline));
    }

    #[tokio::test]
    async fn test_rescan_keeps_error_state() {
        let (supervisor, mut events) = supervisor();
        supervisor.register("bad", true);
        supervisor.spawn(&sh("bad", "exit 3")).unwrap();
        drain_lifetime(&mut events, "bad").await;

        supervisor.register("bad", true);
        let state = supervisor.registry().get("bad").unwrap();
        assert_eq!(state.status, AgentStatus::Error);
        assert_eq!(state.last_exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_register_follows_availability() {
        let (supervisor, _events) = supervisor();
        supervisor.register("flaky", true);
        assert_eq!(supervisor.registry().status("flaky"), Some(AgentStatus::Offline));

        supervisor.register("flaky", false);
        assert_eq!(
            supervisor.registry().status("flaky"),
            Some(AgentStatus::Unavailable)
        );

        supervisor.register("flaky", true);
        assert_eq!(supervisor.registry().status("flaky"), Some(AgentStatus::Offline));
    }

    #[tokio::test]
    async fn test_register_leaves_live_agent_alone() {
        let (supervisor, _events) = supervisor();
        supervisor.spawn(&sh("busy", "exec sleep 30")).unwrap();

        supervisor.register("busy", false);
        assert_eq!(supervisor.registry().status("busy"), Some(AgentStatus::Running));
        assert!(supervisor.is_running("busy"));

        supervisor.stop("busy").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_child_closed_stdin() {
        let (supervisor, mut events) = supervisor();
        supervisor
            .spawn(&sh("deaf", "exec 0<&-; echo closed; exec sleep 30"))
            .unwrap();
        match next_event(&mut events).await {
            AgentEvent::Output(out) => assert_eq!(out.chunk, "closed\n"),
            other => panic!("expected output, got {:?}", other),
        }

        let result = supervisor.send("deaf", "hello").await;
        assert!(matches!(result, Err(ref e) if e.is_not_running()));
        // Later writes fail the same way without touching the pipe
        let again = supervisor.send("deaf", "hello").await;
        assert!(matches!(again, Err(ref e) if e.is_not_running()));

        supervisor.stop("deaf").await.unwrap();
        assert_eq!(supervisor.registry().status("deaf"), Some(AgentStatus::Offline));
    }

    #[tokio::test]
    async fn test_stop_during_blocked_send() {
        let (supervisor, mut events) = supervisor();
        // Never reads stdin, so a large write blocks on a full pipe
        supervisor.spawn(&sh("stuck", "exec sleep 30")).unwrap();

        let sender = supervisor.clone();
        let send = tokio::spawn(async move {
            let payload = "x".repeat(1024 * 1024);
            sender.send("stuck", &payload).await
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!send.is_finished());

        supervisor.stop("stuck").await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), send)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ref e) if e.is_not_running()));

        drain_lifetime(&mut events, "stuck").await;
        assert_eq!(supervisor.registry().status("stuck"), Some(AgentStatus::Offline));
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (supervisor, mut events) = supervisor();
        supervisor.spawn(&AgentDescriptor::new("cat", "cat", "cat")).unwrap();

        const LINES: usize = 20;
        const WIDTH: usize = 8000;
        let payloads: Vec<String> = (0..LINES)
            .map(|i| char::from(b'a' + i as u8).to_string().repeat(WIDTH))
            .collect();
        let sends = payloads.iter().map(|line| supervisor.send("cat", line));
        for result in futures::future::join_all(sends).await {
            result.unwrap();
        }

        let mut echoed = String::new();
        while echoed.len() < LINES * (WIDTH + 1) {
            if let AgentEvent::Output(out) = next_event(&mut events).await {
                echoed.push_str(&out.chunk);
            }
        }

        let mut lines: Vec<&str> = echoed.lines().collect();
        assert_eq!(lines.len(), LINES);
        for line in &lines {
            assert_eq!(line.len(), WIDTH);
            let first = line.as_bytes()[0];
            assert!(line.bytes().all(|b| b == first), "interleaved line");
        }
        lines.sort();
        lines.dedup();
        assert_eq!(lines.len(), LINES);

        supervisor.stop("cat").await.unwrap();
    }
}
