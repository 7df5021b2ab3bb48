//! Agent lifecycle management
//!
//! This module handles:
//! - The catalog of discovered and user-added agents
//! - Agent process lifecycle (start/send/stop, one-shot runs)
//! - Failure reporting to the frontend

mod manager;

pub use manager::AgentManager;
