//! AgentDeck Core Library
//!
//! This crate drives several locally installed command-line AI agents from one
//! chat-style frontend:
//! - Discovery of installed agent executables
//! - One supervised OS process per agent, with streamed output
//! - A command router with consistent status transitions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     agentdeck-core                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  router/       - Intents, active agent, replies             │
//! │  agent/        - Agent catalog and command surface          │
//! │  discovery/    - Known agents, search path, version checks  │
//! │  process/      - Registry, supervisor, output pumps         │
//! │  events/       - Event bus to the frontend                  │
//! │  types/        - Shared type definitions                    │
//! │  config.rs     - Manager configuration                      │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows frontend → router → {discovery | supervisor} → registry →
//! event bus → frontend.

pub mod agent;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod process;
pub mod router;
pub mod types;

// Re-export commonly used types
pub use error::{AgentError, DiscoveryError, Error, Result};
pub use types::*;

pub use agent::AgentManager;
pub use config::ManagerConfig;
pub use discovery::{
    AgentSignature, DiscoveryEngine, DiscoverySettings, VersionCommandProbe, VersionProbe,
};
pub use events::{EventBus, EventStream};
pub use process::{ProcessRegistry, ProcessSupervisor, SupervisorSettings};
pub use router::{CommandRouter, Intent, RouterReply};
