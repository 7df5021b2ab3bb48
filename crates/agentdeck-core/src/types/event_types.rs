//! Events emitted to the frontend

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipe a chunk was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// One chunk of agent output (`agent-output`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    #[serde(rename = "id")]
    pub agent_id: String,
    pub stream: OutputStream,
    #[serde(rename = "data")]
    pub chunk: String,
    pub sequence: u64,
}

/// Process exit notification (`agent-exit`)
///
/// `exit_code: None` means terminated by a signal or unknown, which counts as
/// a clean stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    #[serde(rename = "id")]
    pub agent_id: String,
    #[serde(rename = "code")]
    pub exit_code: Option<i32>,
}

impl ExitEvent {
    pub fn is_clean(&self) -> bool {
        matches!(self.exit_code, None | Some(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

/// Human-readable failure notice (`agent-diagnostic`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    #[serde(rename = "id")]
    pub agent_id: Option<String>,
    pub level: DiagnosticLevel,
    pub message: String,
}

/// Everything the event bus carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum AgentEvent {
    #[serde(rename = "agent-output")]
    Output(OutputEvent),
    #[serde(rename = "agent-exit")]
    Exit(ExitEvent),
    #[serde(rename = "agent-diagnostic")]
    Diagnostic(DiagnosticEvent),
}

impl AgentEvent {
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AgentEvent::Output(e) => Some(&e.agent_id),
            AgentEvent::Exit(e) => Some(&e.agent_id),
            AgentEvent::Diagnostic(e) => e.agent_id.as_deref(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Output(_) => "agent-output",
            AgentEvent::Exit(_) => "agent-exit",
            AgentEvent::Diagnostic(_) => "agent-diagnostic",
        }
    }

    pub fn error(agent_id: Option<&str>, message: impl Into<String>) -> Self {
        AgentEvent::Diagnostic(DiagnosticEvent {
            agent_id: agent_id.map(str::to_string),
            level: DiagnosticLevel::Error,
            message: message.into(),
        })
    }

    pub fn warning(agent_id: Option<&str>, message: impl Into<String>) -> Self {
        AgentEvent::Diagnostic(DiagnosticEvent {
            agent_id: agent_id.map(str::to_string),
            level: DiagnosticLevel::Warning,
            message: message.into(),
        })
    }
}
