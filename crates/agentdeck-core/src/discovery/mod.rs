//! Agent discovery
//!
//! This module handles:
//! - The table of known agent CLIs
//! - Candidate collection from npm global packages and the search path
//! - Bounded, timed version checks that decide availability

mod engine;
mod probe;
mod signatures;

pub use engine::{DiscoveryEngine, DiscoverySettings};
pub use probe::{VersionCommandProbe, VersionProbe};
pub use signatures::AgentSignature;

#[cfg(test)]
pub(crate) use probe::MockVersionProbe;
