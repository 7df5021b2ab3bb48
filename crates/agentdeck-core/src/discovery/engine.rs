//! Discovery engine: find installed agent CLIs and verify they run

use super::probe::{VersionCommandProbe, VersionProbe};
use super::signatures::AgentSignature;
use crate::config::ManagerConfig;
use crate::error::{DiscoveryError, Result};
use crate::types::{AgentDescriptor, DiscoveredAgent};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Discovery tunables
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub version_arg: String,
    pub version_timeout: Duration,
    pub concurrency: usize,
    pub scan_npm_global: bool,
    pub extra_search_dirs: Vec<PathBuf>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self::from(&ManagerConfig::default())
    }
}

impl From<&ManagerConfig> for DiscoverySettings {
    fn from(config: &ManagerConfig) -> Self {
        Self {
            version_arg: config.version_arg.clone(),
            version_timeout: config.version_timeout(),
            concurrency: config.discovery_concurrency,
            scan_npm_global: config.scan_npm_global,
            extra_search_dirs: config.extra_search_dirs.clone(),
        }
    }
}

/// Where a candidate was found; earlier variants win on duplicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum CandidateSource {
    /// Known install location of a known package (npm global bin)
    KnownInstall,
    /// Matching executable name on the search path
    SearchPath,
}

#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub signature: AgentSignature,
    pub source: CandidateSource,
    /// Path as found, used for launching
    pub path: PathBuf,
    /// Symlink-free path, the identity for deduplication
    pub resolved: PathBuf,
}

impl Candidate {
    fn new(signature: &AgentSignature, source: CandidateSource, path: PathBuf) -> Self {
        let resolved = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        Self {
            signature: signature.clone(),
            source,
            path,
            resolved,
        }
    }
}

/// Scans the host for agent executables
pub struct DiscoveryEngine {
    signatures: Vec<AgentSignature>,
    settings: DiscoverySettings,
    /// Overrides the process PATH
    search_path: Option<Vec<PathBuf>>,
    probe: Arc<dyn VersionProbe>,
}

impl DiscoveryEngine {
    pub fn new(settings: DiscoverySettings) -> Self {
        let probe = Arc::new(VersionCommandProbe::new(
            settings.version_arg.clone(),
            settings.version_timeout,
        ));
        Self {
            signatures: AgentSignature::builtin(),
            settings,
            search_path: None,
            probe,
        }
    }

    pub fn with_signatures(mut self, signatures: Vec<AgentSignature>) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = Some(dirs);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn VersionProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn signatures(&self) -> &[AgentSignature] {
        &self.signatures
    }

    /// Find and verify every known agent installed on this host
    ///
    /// One entry per agent id, never two with the same resolved path. A failed
    /// check excludes only that candidate; an unusable environment yields an
    /// empty list.
    pub async fn discover(&self) -> Vec<DiscoveredAgent> {
        match self.try_discover().await {
            Ok(found) => found,
            Err(e) => {
                error!("Agent discovery failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_discover(&self) -> Result<Vec<DiscoveredAgent>> {
        let search_dirs = self.search_dirs()?;

        let mut candidates = Vec::new();
        if self.settings.scan_npm_global {
            candidates.extend(self.npm_candidates(&search_dirs).await);
        }
        candidates.extend(self.path_candidates(&search_dirs));
        let candidates = dedupe_by_path(candidates);

        info!("Verifying {} agent candidate(s)", candidates.len());
        let probe = &self.probe;
        let checked: Vec<(Candidate, std::result::Result<Option<String>, DiscoveryError>)> =
            stream::iter(candidates)
                .map(|candidate| async move {
                    let outcome = probe.probe(&candidate.path).await;
                    (candidate, outcome)
                })
                .buffered(self.settings.concurrency.max(1))
                .collect()
                .await;

        let mut found: Vec<DiscoveredAgent> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();

        for (candidate, outcome) in checked {
            let (available, version) = match outcome {
                Ok(version) => (true, version),
                Err(e) => {
                    warn!("Excluding agent candidate: {}", e);
                    (false, None)
                }
            };
            let agent = DiscoveredAgent {
                descriptor: candidate.signature.descriptor(&candidate.path, version),
                available,
            };

            match by_id.get(candidate.signature.id()) {
                // A later working copy replaces a broken one
                Some(&index) if available && !found[index].available => found[index] = agent,
                Some(_) => debug!(
                    "Skipping extra copy of {} at {:?}",
                    candidate.signature.id(),
                    candidate.path
                ),
                None => {
                    by_id.insert(candidate.signature.id().to_string(), found.len());
                    found.push(agent);
                }
            }
        }

        info!(
            "Discovered {} agent(s), {} available",
            found.len(),
            found.iter().filter(|a| a.available).count()
        );
        Ok(found)
    }

    /// Verify a user-supplied descriptor the same way discovered ones are
    pub async fn verify(&self, descriptor: &AgentDescriptor) -> DiscoveredAgent {
        let executable = self.resolve_command(&descriptor.launch_command);
        let mut verified = descriptor.clone();

        let available = match executable {
            Some(path) => match self.probe.probe(&path).await {
                Ok(version) => {
                    verified.version = version.or(verified.version);
                    verified.install_path = Some(path);
                    true
                }
                Err(e) => {
                    warn!("Agent {} failed verification: {}", descriptor.id, e);
                    false
                }
            },
            None => {
                warn!(
                    "Agent {} executable '{}' not found",
                    descriptor.id, descriptor.launch_command
                );
                false
            }
        };

        DiscoveredAgent {
            descriptor: verified,
            available,
        }
    }

    fn resolve_command(&self, command: &str) -> Option<PathBuf> {
        let path = Path::new(command);
        if path.components().count() > 1 {
            return path.is_file().then(|| path.to_path_buf());
        }
        let dirs = self.search_dirs().ok()?;
        dirs.iter()
            .find_map(|dir| which::which_in(command, Some(dir), dir).ok())
    }

    fn search_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => std::env::var_os("PATH")
                .map(|path| std::env::split_paths(&path).collect())
                .unwrap_or_default(),
        };
        dirs.extend(self.settings.extra_search_dirs.iter().cloned());
        dirs.retain(|dir| !dir.as_os_str().is_empty());

        if dirs.is_empty() {
            return Err(DiscoveryError::NoSearchPath.into());
        }
        Ok(dirs)
    }

    /// Executables on the search path whose name matches a known agent
    fn path_candidates(&self, dirs: &[PathBuf]) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for signature in &self.signatures {
            for dir in dirs {
                if let Ok(path) = which::which_in(&signature.command, Some(dir), dir) {
                    debug!("Found {} at {:?}", signature.command, path);
                    candidates.push(Candidate::new(signature, CandidateSource::SearchPath, path));
                }
            }
        }
        candidates
    }

    /// Known agents installed as global npm packages
    ///
    /// Both npm calls share one `version_timeout` deadline.
    async fn npm_candidates(&self, dirs: &[PathBuf]) -> Vec<Candidate> {
        let packaged: Vec<&AgentSignature> = self
            .signatures
            .iter()
            .filter(|s| s.npm_package.is_some())
            .collect();
        if packaged.is_empty() {
            return Vec::new();
        }

        let Some(npm) = dirs
            .iter()
            .find_map(|dir| which::which_in("npm", Some(dir), dir).ok())
        else {
            debug!("npm not on the search path, skipping global packages");
            return Vec::new();
        };

        let deadline = self.settings.version_timeout;
        match tokio::time::timeout(deadline, Self::npm_installs(&npm, packaged)).await {
            Ok(candidates) => candidates,
            Err(_) => {
                warn!("npm global scan timed out after {:?}", deadline);
                Vec::new()
            }
        }
    }

    async fn npm_installs(npm: &Path, packaged: Vec<&AgentSignature>) -> Vec<Candidate> {
        let Some(listing) = run_npm(npm, &["list", "-g", "--depth=0", "--json"]).await else {
            return Vec::new();
        };
        let installed = parse_npm_listing(&listing);
        let matched: Vec<&AgentSignature> = packaged
            .into_iter()
            .filter(|s| s.npm_package.as_ref().is_some_and(|p| installed.contains(p)))
            .collect();
        if matched.is_empty() {
            return Vec::new();
        }

        let Some(prefix) = run_npm(npm, &["prefix", "-g"]).await else {
            return Vec::new();
        };
        let bin_dir = npm_bin_dir(Path::new(prefix.trim()));

        matched
            .into_iter()
            .filter_map(|signature| {
                which::which_in(&signature.command, Some(&bin_dir), &bin_dir)
                    .ok()
                    .map(|path| Candidate::new(signature, CandidateSource::KnownInstall, path))
            })
            .collect()
    }
}

/// Run npm to completion; the child dies with the future
async fn run_npm(npm: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(npm)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        // `npm list` exits non-zero on peer-dependency noise but still prints JSON
        Ok(output) if !output.stdout.is_empty() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(_) => None,
        Err(e) => {
            debug!("npm {:?} failed: {}", args, e);
            None
        }
    }
}

/// Keep one candidate per resolved path, preferring known-install metadata
pub(crate) fn dedupe_by_path(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    let mut seen: HashMap<PathBuf, usize> = HashMap::new();

    for candidate in candidates {
        match seen.get(&candidate.resolved) {
            Some(&index) => {
                if candidate.source < kept[index].source {
                    kept[index] = candidate;
                }
            }
            None => {
                seen.insert(candidate.resolved.clone(), kept.len());
                kept.push(candidate);
            }
        }
    }
    kept
}

/// Package names from `npm list -g --json`
fn parse_npm_listing(json: &str) -> HashSet<String> {
    serde_json::from_str::<serde_json::Value>(json)
        .ok()
        .and_then(|value| {
            value
                .get("dependencies")
                .and_then(|deps| deps.as_object())
                .map(|deps| deps.keys().cloned().collect())
        })
        .unwrap_or_default()
}

fn npm_bin_dir(prefix: &Path) -> PathBuf {
    if cfg!(windows) {
        prefix.to_path_buf()
    } else {
        prefix.join("bin")
    }
}
