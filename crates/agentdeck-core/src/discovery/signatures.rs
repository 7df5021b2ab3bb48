//! Known agent identities
//!
//! Used to identify executables found on the system, not to decide what is
//! shown: an entry only surfaces if its executable is actually installed.

use crate::types::AgentDescriptor;
use std::path::Path;

/// Identity and display metadata for one known agent CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSignature {
    /// Default executable name, also used as the agent id
    pub command: String,
    pub name: String,
    pub short_name: String,
    pub color: String,
    /// Global npm package that ships the executable, if any
    pub npm_package: Option<String>,
}

impl AgentSignature {
    pub fn new(
        command: impl Into<String>,
        name: impl Into<String>,
        short_name: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            name: name.into(),
            short_name: short_name.into(),
            color: color.into(),
            npm_package: None,
        }
    }

    pub fn with_npm_package(mut self, package: impl Into<String>) -> Self {
        self.npm_package = Some(package.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.command
    }

    /// Descriptor for this agent installed at `path`
    pub fn descriptor(&self, path: &Path, version: Option<String>) -> AgentDescriptor {
        AgentDescriptor::new(&self.command, &self.name, path.to_string_lossy())
            .with_short_name(&self.short_name)
            .with_color(&self.color)
            .with_version(version)
            .with_install_path(path)
    }

    /// Built-in table of agents we know how to recognize
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new("claude", "Claude Code", "CC", "#00FF64")
                .with_npm_package("@anthropic-ai/claude-code"),
            Self::new("codex", "Codex CLI", "CX", "#3B82F6").with_npm_package("@openai/codex"),
            Self::new("gemini", "Gemini CLI", "GM", "#FFB800")
                .with_npm_package("@google/gemini-cli"),
            Self::new("aider", "Aider", "AI", "#9333EA"),
            Self::new("cody", "Cody CLI", "CD", "#FF5733"),
            Self::new("continue", "Continue", "CN", "#1389FD"),
            Self::new("cursor-agent", "Cursor Agent", "CR", "#7C3AED"),
            Self::new("amp", "Amp", "AM", "#F59E0B").with_npm_package("@sourcegraph/amp"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_ids_are_unique() {
        let signatures = AgentSignature::builtin();
        let ids: HashSet<&str> = signatures.iter().map(|s| s.id()).collect();
        assert_eq!(ids.len(), signatures.len());
    }

    #[test]
    fn test_descriptor_uses_resolved_path() {
        let signature = AgentSignature::new("codex", "Codex CLI", "CX", "#3B82F6");
        let descriptor = signature.descriptor(Path::new("/opt/bin/codex"), Some("1.0".to_string()));

        assert_eq!(descriptor.id, "codex");
        assert_eq!(descriptor.short_name, "CX");
        assert_eq!(descriptor.launch_command, "/opt/bin/codex");
        assert_eq!(descriptor.version.as_deref(), Some("1.0"));
    }
}
