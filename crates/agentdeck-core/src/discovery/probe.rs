//! Liveness check for candidate executables

use crate::error::DiscoveryError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Verifies that an executable runs, returning its version string
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionProbe: Send + Sync {
    /// `Ok(None)` means alive but printed nothing
    async fn probe(&self, executable: &Path) -> std::result::Result<Option<String>, DiscoveryError>;
}

/// Runs `<executable> --version` under a hard timeout
pub struct VersionCommandProbe {
    arg: String,
    timeout: Duration,
}

impl VersionCommandProbe {
    pub fn new(arg: impl Into<String>, timeout: Duration) -> Self {
        Self {
            arg: arg.into(),
            timeout,
        }
    }
}

#[async_trait]
impl VersionProbe for VersionCommandProbe {
    async fn probe(
        &self,
        executable: &Path,
    ) -> std::result::Result<Option<String>, DiscoveryError> {
        let command = executable.display().to_string();
        trace!("Probing {} {}", command, self.arg);

        // kill_on_drop reaps the candidate if the timeout drops the future
        let child = Command::new(executable)
            .arg(&self.arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DiscoveryError::VersionCheckFailed {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(DiscoveryError::VersionCheckFailed {
                    command,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(DiscoveryError::Timeout {
                    command,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        if !output.status.success() {
            return Err(DiscoveryError::VersionCheckFailed {
                command,
                reason: format!("exited with {}", output.status),
            });
        }

        // Some CLIs print their version on stderr
        let version = first_line(&output.stdout).or_else(|| first_line(&output.stderr));
        debug!("{} is alive (version {:?})", command, version);
        Ok(version)
    }
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
