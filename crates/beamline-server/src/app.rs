//! Composition root.
//!
//! Wires one [`ChangeBroadcaster`], one [`AdapterRegistry`] and one
//! [`ControlManager`] together and exposes the client-facing write path:
//! requests resolve an adapter id through the registry and are only accepted
//! from the operator.

use crate::config::ServiceConfig;
use beamline_control::{ControlManager, InMemoryIdentity};
use beamline_core::{AdapterSnapshot, ChangeBroadcaster, ClientEvent};
use beamline_hardware::drivers::mock::MockRepository;
use beamline_hardware::{bootstrap, AdapterRegistry, BootstrapReport, HardwareRepository, StartupError};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Rejected client request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No adapter under this id
    #[error("Unknown beamline attribute: {0}")]
    UnknownAdapter(String),

    /// Writes are reserved to the operator
    #[error("User {0} is not in control")]
    NotInControl(String),
}

/// The running service.
pub struct App {
    config: ServiceConfig,
    broadcaster: ChangeBroadcaster,
    registry: Arc<AdapterRegistry>,
    control: ControlManager,
    report: BootstrapReport,
}

impl App {
    /// Build the service over the configured mock hardware.
    ///
    /// # Errors
    /// [`StartupError`] if the hardware repository cannot be enumerated.
    pub async fn build(config: ServiceConfig) -> Result<Self, StartupError> {
        let repository = MockRepository::from_config(&config.hardware.objects);
        Self::with_repository(config, &repository).await
    }

    /// Build the service over any hardware repository.
    ///
    /// # Errors
    /// [`StartupError`] if the repository cannot be enumerated.
    pub async fn with_repository(
        config: ServiceConfig,
        repository: &dyn HardwareRepository,
    ) -> Result<Self, StartupError> {
        let broadcaster = ChangeBroadcaster::new();
        let registry = Arc::new(AdapterRegistry::new());
        let report = bootstrap(repository, &registry, &broadcaster).await?;

        let identity = Arc::new(InMemoryIdentity::new(config.accounts.clone()));
        let control = ControlManager::builder(config.control.clone(), identity)
            .with_session_info(config.session.clone())
            .with_broadcaster(broadcaster.clone())
            .build();

        Ok(Self {
            config,
            broadcaster,
            registry,
            control,
            report,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Shared adapter registry.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Control manager.
    pub fn control(&self) -> &ControlManager {
        &self.control
    }

    /// Broadcaster for client events.
    pub fn broadcaster(&self) -> &ChangeBroadcaster {
        &self.broadcaster
    }

    /// Outcome of the startup enumeration.
    pub fn report(&self) -> &BootstrapReport {
        &self.report
    }

    fn writable_adapter(
        &self,
        username: &str,
        id: &str,
    ) -> Result<Arc<beamline_hardware::Adapter>, RequestError> {
        if !self.control.is_operator(username) {
            return Err(RequestError::NotInControl(username.to_string()));
        }
        self.registry
            .lookup(id)
            .ok_or_else(|| RequestError::UnknownAdapter(id.to_string()))
    }

    /// Full state of one adapter.
    ///
    /// # Errors
    /// [`RequestError::UnknownAdapter`] if no adapter has this id.
    pub async fn get_attribute(&self, id: &str) -> Result<AdapterSnapshot, RequestError> {
        let adapter = self
            .registry
            .lookup(id)
            .ok_or_else(|| RequestError::UnknownAdapter(id.to_string()))?;
        Ok(adapter.to_snapshot().await)
    }

    /// Write a value on behalf of `username`.
    ///
    /// Hardware faults come back as an `UNUSABLE` snapshot, not as an error.
    ///
    /// # Errors
    /// Unknown adapter id, or the user is not the operator.
    pub async fn set_attribute(
        &self,
        username: &str,
        id: &str,
        value: Value,
    ) -> Result<AdapterSnapshot, RequestError> {
        let adapter = self.writable_adapter(username, id)?;
        Ok(adapter.set_value(value).await)
    }

    /// Abort the action in progress on an adapter.
    ///
    /// # Errors
    /// Unknown adapter id, or the user is not the operator.
    pub async fn stop_attribute(
        &self,
        username: &str,
        id: &str,
    ) -> Result<AdapterSnapshot, RequestError> {
        let adapter = self.writable_adapter(username, id)?;
        Ok(adapter.stop().await)
    }

    /// Run an exported command.
    ///
    /// # Errors
    /// Unknown adapter id, or the user is not the operator.
    pub async fn execute_command(
        &self,
        username: &str,
        id: &str,
        command: &str,
        args: Value,
    ) -> Result<AdapterSnapshot, RequestError> {
        let adapter = self.writable_adapter(username, id)?;
        Ok(adapter.execute_command(command, args).await)
    }

    /// Human-readable adapter table.
    pub fn adapter_table(&self) -> String {
        let rows = self.registry.list();
        let width = rows.iter().map(|r| r.id.len()).max().unwrap_or(0).max(2);

        let mut table = String::new();
        let _ = writeln!(table, "{:<width$}  {:<15}  OBJECT", "ID", "KIND");
        for row in rows {
            let suffix = if row.placeholder { "  (unavailable)" } else { "" };
            let _ = writeln!(
                table,
                "{:<width$}  {:<15}  {}{}",
                row.id,
                row.kind.as_str(),
                row.object,
                suffix
            );
        }
        table
    }

    /// Log every client event until the broadcaster is gone.
    pub fn spawn_event_log(&self) -> JoinHandle<()> {
        let mut rx = self.broadcaster.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event log lagging, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &ClientEvent) {
    debug!(channel = %event.channel, payload = %event.payload, "Client event");
}
