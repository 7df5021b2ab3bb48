//! Agent lifecycle manager
//!
//! The command surface handed to the frontend: discover, spawn, send, run-once
//! and stop, plus catalog bookkeeping.

use crate::config::ManagerConfig;
use crate::discovery::{DiscoveryEngine, DiscoverySettings};
use crate::error::{AgentError, Error, Result};
use crate::events::{EventBus, EventStream};
use crate::process::{ProcessRegistry, ProcessSupervisor, SupervisorSettings};
use crate::types::*;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Manages agent descriptors and their processes
pub struct AgentManager {
    config: ManagerConfig,
    /// Known agents in registration order
    catalog: RwLock<Vec<AgentDescriptor>>,
    discovery: DiscoveryEngine,
    supervisor: ProcessSupervisor,
    registry: Arc<ProcessRegistry>,
    bus: Arc<EventBus>,
}

impl AgentManager {
    pub fn new(config: ManagerConfig) -> Self {
        let discovery = DiscoveryEngine::new(DiscoverySettings::from(&config));
        Self::with_discovery(config, discovery)
    }

    /// Use a preconfigured discovery engine (custom search path, probe)
    pub fn with_discovery(config: ManagerConfig, discovery: DiscoveryEngine) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let bus = Arc::new(EventBus::new());
        let supervisor = ProcessSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            SupervisorSettings::from(&config),
        );

        Self {
            config,
            catalog: RwLock::new(Vec::new()),
            discovery,
            supervisor,
            registry,
            bus,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    /// Publish a failure notice for the frontend
    pub fn report(&self, agent_id: Option<&str>, message: impl Into<String>) {
        self.bus.publish(AgentEvent::error(agent_id, message));
    }

    /// Scan the host and register every available agent
    ///
    /// Unavailable discoveries are returned but not registered. When nothing
    /// usable is found the configured fallback agent is registered instead.
    pub async fn discover(&self) -> Vec<DiscoveredAgent> {
        let found = self.discovery.discover().await;

        for agent in found.iter().filter(|a| a.available) {
            self.register(agent.descriptor.clone(), true);
        }

        if !found.iter().any(|a| a.available) && self.catalog.read().is_empty() {
            let fallback = self.config.fallback_agent.clone().normalized();
            info!("No agents discovered, registering fallback: {}", fallback.id);
            self.register(fallback, true);
        }

        found
    }

    /// Verify and register the user-configured agents
    pub async fn load_custom_agents(&self) {
        for descriptor in self.config.custom_agents.clone() {
            self.add_agent(descriptor).await;
        }
    }

    /// Add a user-supplied agent; failing verification marks it unavailable
    pub async fn add_agent(&self, descriptor: AgentDescriptor) -> DiscoveredAgent {
        let descriptor = descriptor.normalized();
        let verified = self.discovery.verify(&descriptor).await;
        if !verified.available {
            self.report(
                Some(&descriptor.id),
                format!(
                    "Agent '{}' is unavailable: '{}' could not be verified",
                    descriptor.display_name, descriptor.launch_command
                ),
            );
        }
        self.register(verified.descriptor.clone(), verified.available);
        verified
    }

    /// Remove a non-running agent from the catalog
    pub fn remove_agent(&self, id: &str) -> Result<()> {
        self.supervisor.unregister(id)?;
        self.catalog.write().retain(|d| d.id != id);
        info!("Removed agent: {}", id);
        Ok(())
    }

    fn register(&self, descriptor: AgentDescriptor, available: bool) {
        self.supervisor.register(&descriptor.id, available);

        // A live process keeps the descriptor it was started from
        let live = self
            .registry
            .status(&descriptor.id)
            .is_some_and(AgentStatus::is_live);

        let mut catalog = self.catalog.write();
        match catalog.iter_mut().find(|d| d.id == descriptor.id) {
            Some(existing) if !live => *existing = descriptor,
            Some(_) => debug!("Agent {} is live, descriptor unchanged", descriptor.id),
            None => {
                info!("Registered agent: {} ({})", descriptor.display_name, descriptor.id);
                catalog.push(descriptor);
            }
        }
    }

    pub fn descriptor(&self, id: &str) -> Option<AgentDescriptor> {
        self.catalog.read().iter().find(|d| d.id == id).cloned()
    }

    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.catalog.read().clone()
    }

    pub fn status(&self, id: &str) -> Option<AgentStatus> {
        self.registry.status(id)
    }

    pub fn state(&self, id: &str) -> Option<AgentRuntimeState> {
        self.registry.get(id)
    }

    /// Descriptor and runtime state of every registered agent
    pub fn list_agents(&self) -> Vec<AgentInfo> {
        self.catalog
            .read()
            .iter()
            .map(|descriptor| AgentInfo {
                descriptor: descriptor.clone(),
                state: self
                    .registry
                    .get(&descriptor.id)
                    .unwrap_or_else(|| AgentRuntimeState::new(&descriptor.id)),
            })
            .collect()
    }

    /// Start a registered agent in session mode
    pub fn start(&self, id: &str) -> Result<AgentRuntimeState> {
        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| Error::Agent(AgentError::NotFound(id.to_string())))?;
        self.supervisor.spawn(&descriptor)
    }

    /// Start `command args` in session mode under `id`
    ///
    /// An unknown id is registered on the fly with a descriptor built from
    /// the command.
    pub fn spawn(&self, id: &str, command: &str, args: Vec<String>) -> Result<AgentRuntimeState> {
        let descriptor = match self.descriptor(id) {
            Some(existing) => AgentDescriptor {
                launch_command: command.to_string(),
                launch_args: args,
                ..existing
            },
            None => AgentDescriptor::new(id, command, command).with_args(args),
        };

        if self.supervisor.is_running(id) {
            return Err(Error::Agent(AgentError::AlreadyRunning(id.to_string())));
        }
        if !self.registry.contains(id) {
            self.register(descriptor.clone(), true);
        }
        self.supervisor.spawn(&descriptor)
    }

    /// Write a line to the agent's stdin
    pub async fn send(&self, id: &str, input: &str) -> Result<()> {
        let result = self.supervisor.send(id, input).await;
        if let Err(e) = &result {
            warn!("Send to {} failed: {}", id, e);
            self.report(Some(id), e.to_string());
        }
        result
    }

    /// One-shot invocation of a registered agent with `message` as its prompt
    pub async fn run_once(&self, id: &str, message: &str) -> Result<Option<i32>> {
        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| Error::Agent(AgentError::NotFound(id.to_string())))?;
        self.supervisor.run_once(&descriptor, message).await
    }

    /// One-shot invocation of an explicit command under `id`
    pub async fn run_command_once(
        &self,
        id: &str,
        command: &str,
        message: &str,
    ) -> Result<Option<i32>> {
        let descriptor = match self.descriptor(id) {
            Some(existing) => AgentDescriptor {
                launch_command: command.to_string(),
                ..existing
            },
            None => {
                let descriptor = AgentDescriptor::new(id, command, command);
                self.register(descriptor.clone(), true);
                descriptor
            }
        };
        self.supervisor.run_once(&descriptor, message).await
    }

    /// Graceful-then-forced stop; a no-op for agents without a process
    pub async fn stop(&self, id: &str) -> Result<()> {
        self.supervisor.stop(id).await
    }

    pub async fn stop_all(&self) {
        self.supervisor.stop_all().await
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.supervisor.is_running(id)
    }

    /// Ids of agents with a live process
    pub fn running_agents(&self) -> Vec<String> {
        self.supervisor.running_ids()
    }
}
