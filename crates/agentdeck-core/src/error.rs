//! Error types for AgentDeck Core

use crate::types::AgentStatus;
use thiserror::Error;

/// Main error type for AgentDeck operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-agent lifecycle errors
///
/// Every variant is scoped to a single agent id; none of them affects other
/// agents or the router.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent not running: {0}")]
    NotRunning(String),

    #[error("Agent already running: {0}")]
    AlreadyRunning(String),

    #[error("Agent is still running, stop it first: {0}")]
    StillRunning(String),

    #[error("Agent unavailable on this system: {0}")]
    Unavailable(String),

    #[error("Failed to start agent '{id}': {reason}")]
    SpawnFailure { id: String, reason: String },

    #[error("Agent '{id}' exited with code {code}")]
    AbnormalExit { id: String, code: i32 },

    #[error("Illegal status transition for '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: AgentStatus,
        to: AgentStatus,
    },

    #[error("No active agent selected")]
    NoActiveAgent,
}

/// Discovery errors
///
/// Candidate-level errors are logged and the candidate is excluded; only
/// `NoSearchPath` concerns discovery as a whole.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Version check for '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Version check for '{command}' failed: {reason}")]
    VersionCheckFailed { command: String, reason: String },

    #[error("No executable search path available")]
    NoSearchPath,
}

impl AgentError {
    /// Whether the supervisor already published a diagnostic for this failure.
    pub fn already_reported(&self) -> bool {
        matches!(
            self,
            AgentError::SpawnFailure { .. } | AgentError::AbnormalExit { .. }
        )
    }

    /// The agent id this error is about, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AgentError::NotFound(id)
            | AgentError::NotRunning(id)
            | AgentError::AlreadyRunning(id)
            | AgentError::StillRunning(id)
            | AgentError::Unavailable(id) => Some(id),
            AgentError::SpawnFailure { id, .. }
            | AgentError::AbnormalExit { id, .. }
            | AgentError::InvalidTransition { id, .. } => Some(id),
            AgentError::NoActiveAgent => None,
        }
    }
}

impl Error {
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Error::Agent(e) => e.agent_id(),
            _ => None,
        }
    }

    pub fn already_reported(&self) -> bool {
        matches!(self, Error::Agent(e) if e.already_reported())
    }

    pub fn is_not_running(&self) -> bool {
        matches!(self, Error::Agent(AgentError::NotRunning(_)))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
