//! Agent descriptor and runtime state types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Static identity of an agent executable.
///
/// Created by discovery (or added by the user) and never mutated afterwards;
/// `id` is the identity key for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    /// Derived from the display name when left empty
    #[serde(default)]
    pub short_name: String,
    #[serde(rename = "command")]
    pub launch_command: String,
    #[serde(default, rename = "args")]
    pub launch_args: Vec<String>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, rename = "path")]
    pub install_path: Option<PathBuf>,
}

fn default_color() -> String {
    "#9CA3AF".to_string()
}

impl AgentDescriptor {
    /// Create a descriptor with a derived short name and the neutral color
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        launch_command: impl Into<String>,
    ) -> Self {
        let display_name = display_name.into();
        Self {
            id: id.into(),
            short_name: short_name_for(&display_name),
            display_name,
            launch_command: launch_command.into(),
            launch_args: Vec::new(),
            color: default_color(),
            version: None,
            install_path: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.launch_args = args;
        self
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_path = Some(path.into());
        self
    }

    /// Fill in a missing short name, e.g. for hand-written config entries
    pub fn normalized(mut self) -> Self {
        if self.short_name.trim().is_empty() {
            self.short_name = short_name_for(&self.display_name);
        }
        self
    }

    /// Built-in descriptor used when discovery finds nothing usable
    pub fn fallback() -> Self {
        Self::new("claude", "Claude Code", "claude")
            .with_short_name("CC")
            .with_color("#00FF64")
    }
}

/// Two-letter badge: initials of the first two words, else the first two letters.
fn short_name_for(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let short: String = if words.len() >= 2 {
        words.iter().take(2).filter_map(|w| w.chars().next()).collect()
    } else {
        name.chars().take(2).collect()
    };
    short.to_uppercase()
}

/// Agent lifecycle status
///
/// Legal transitions:
///
/// ```text
/// offline ──> starting ──> running ──> offline
///    ^            │           │
///    │            v           v
///    └──────── error <────────┘
/// ```
///
/// `unavailable` is assigned at registration from a failed verification and is
/// never the source or target of a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Not running; can be started
    #[default]
    Offline,
    /// Spawn requested, process not yet confirmed alive
    Starting,
    /// A live process is attached
    Running,
    /// Last start or run failed; can be started again
    Error,
    /// Failed verification; cannot be started
    Unavailable,
}

impl AgentStatus {
    /// Lifecycle moves made by the supervisor
    ///
    /// `offline` and `unavailable` swap on re-verification, outside this table.
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Offline, Starting)
                | (Error, Starting)
                | (Starting, Running)
                | (Starting, Error)
                | (Running, Offline)
                | (Running, Error)
        )
    }

    /// Whether a process is (or is about to be) attached
    pub fn is_live(self) -> bool {
        matches!(self, AgentStatus::Starting | AgentStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Offline => "offline",
            AgentStatus::Starting => "starting",
            AgentStatus::Running => "running",
            AgentStatus::Error => "error",
            AgentStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Mutable runtime record, owned by the process registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRuntimeState {
    pub agent_id: String,
    pub status: AgentStatus,
    pub pid: Option<u32>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_exit_code: Option<i32>,
}

impl AgentRuntimeState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self::with_status(agent_id, AgentStatus::Offline)
    }

    pub fn with_status(agent_id: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            agent_id: agent_id.into(),
            status,
            pid: None,
            started_at: None,
            last_exit_code: None,
        }
    }
}

/// Result of discovery for one known agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredAgent {
    #[serde(flatten)]
    pub descriptor: AgentDescriptor,
    pub available: bool,
}

/// Snapshot returned to the frontend by `AgentManager::list_agents`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub descriptor: AgentDescriptor,
    pub state: AgentRuntimeState,
}

/// How a message is delivered to an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LaunchMode {
    /// Long-lived process, input written to stdin
    #[default]
    Session,
    /// Process invoked with the prompt as its last argument, runs to completion
    OneShot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use AgentStatus::*;
        assert!(Offline.can_transition_to(Starting));
        assert!(Error.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Error));
        assert!(Running.can_transition_to(Offline));
        assert!(Running.can_transition_to(Error));

        assert!(!Offline.can_transition_to(Running));
        assert!(!Running.can_transition_to(Starting));
        for status in [Offline, Starting, Running, Error, Unavailable] {
            assert!(!Unavailable.can_transition_to(status));
            assert!(!status.can_transition_to(Unavailable));
        }
    }

    #[test]
    fn test_short_name_derivation() {
        assert_eq!(AgentDescriptor::new("a", "Codex CLI", "codex").short_name, "CC");
        assert_eq!(AgentDescriptor::new("b", "aider", "aider").short_name, "AI");

        let json = r#"{"id": "m", "name": "My Agent", "command": "my-agent"}"#;
        let from_config: AgentDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(from_config.short_name, "");
        assert_eq!(from_config.normalized().short_name, "MA");
    }

    #[test]
    fn test_discovered_agent_wire_shape() {
        let agent = DiscoveredAgent {
            descriptor: AgentDescriptor::new("codex", "Codex CLI", "/usr/bin/codex")
                .with_short_name("CX")
                .with_color("#3B82F6")
                .with_version(Some("0.1.2".to_string()))
                .with_install_path("/usr/bin/codex"),
            available: true,
        };

        let value = serde_json::to_value(&agent).unwrap();
        assert_eq!(value["id"], "codex");
        assert_eq!(value["name"], "Codex CLI");
        assert_eq!(value["shortName"], "CX");
        assert_eq!(value["command"], "/usr/bin/codex");
        assert_eq!(value["path"], "/usr/bin/codex");
        assert_eq!(value["version"], "0.1.2");
        assert_eq!(value["available"], true);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&AgentStatus::Unavailable).unwrap();
        assert_eq!(json, "\"unavailable\"");
    }
}
