//! Agent process lifecycle
//!
//! This module handles:
//! - Runtime state per agent (`ProcessRegistry`)
//! - Spawning, stdin writes, stop/kill and exit detection (`ProcessSupervisor`)
//! - Streaming stdout/stderr into sequenced output events

mod handle;
mod output;
mod registry;
mod signal;
mod supervisor;

pub use registry::ProcessRegistry;
pub use supervisor::{ProcessSupervisor, SupervisorSettings};
