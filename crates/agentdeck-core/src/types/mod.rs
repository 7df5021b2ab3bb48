//! Core type definitions for AgentDeck
//!
//! Descriptors, runtime state and the events delivered to the frontend.

mod agent_types;
mod event_types;

pub use agent_types::*;
pub use event_types::*;
