//! Hardware repository bootstrap.
//!
//! The hardware repository is an external collaborator that hands over
//! every configured hardware object once, at startup. [`bootstrap`] pushes
//! each handle through the classifier into the registry:
//!
//! 1. Derive the adapter id ([`derive_adapter_id`])
//! 2. Classify and construct the adapter (unmatched objects are skipped)
//! 3. Register it (duplicates are skipped, first one wins)
//!
//! Only a failing enumeration aborts startup; every per-object problem is
//! logged and recorded in the [`BootstrapReport`].

use crate::adapter::Adapter;
use crate::registry::{AdapterRegistry, RegisterOutcome, SkipReason};
use async_trait::async_trait;
use beamline_core::{ChangeBroadcaster, HardwareHandle};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Source of hardware objects.
#[async_trait]
pub trait HardwareRepository: Send + Sync {
    /// Enumerate every hardware object, once.
    async fn enumerate(&self) -> anyhow::Result<Vec<HardwareHandle>>;
}

/// Fatal bootstrap failure.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The repository could not enumerate its objects
    #[error("hardware repository enumeration failed: {0:#}")]
    Enumeration(#[source] anyhow::Error),
}

/// What happened to each enumerated object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Ids of registered adapters
    pub registered: Vec<String>,
    /// Ids registered as unavailable placeholders
    pub placeholders: Vec<String>,
    /// Ids dropped as duplicates
    pub duplicates: Vec<String>,
    /// Names of objects no adapter kind matched
    pub unclassified: Vec<String>,
}

impl BootstrapReport {
    /// Number of objects the repository enumerated.
    pub fn enumerated(&self) -> usize {
        self.registered.len() + self.duplicates.len() + self.unclassified.len()
    }
}

/// Derive the adapter id of a hardware object.
///
/// The username wins when set; otherwise the object name with its leading
/// `/` stripped. Spaces become underscores and the result is lower case.
pub fn derive_adapter_id(handle: &HardwareHandle) -> String {
    let raw = match handle.object.username() {
        Some(username) if !username.trim().is_empty() => username,
        _ => {
            let name = handle.name();
            name.strip_prefix('/').unwrap_or(name)
        }
    };
    raw.trim().replace(' ', "_").to_lowercase()
}

/// Enumerate, classify and register every hardware object.
///
/// # Errors
/// Returns [`StartupError`] when the repository cannot enumerate.
#[instrument(skip_all)]
pub async fn bootstrap(
    repository: &dyn HardwareRepository,
    registry: &AdapterRegistry,
    broadcaster: &ChangeBroadcaster,
) -> Result<BootstrapReport, StartupError> {
    let handles = repository
        .enumerate()
        .await
        .map_err(StartupError::Enumeration)?;
    info!(count = handles.len(), "Hardware objects enumerated");

    let mut report = BootstrapReport::default();
    for handle in handles {
        let id = derive_adapter_id(&handle);
        let name = handle.name().to_string();

        if registry.contains(&id) {
            warn!(adapter_id = %id, object = %name, "Duplicate adapter id, skipping registration");
            report.duplicates.push(id);
            continue;
        }

        let Some(adapter) = Adapter::create(id.clone(), handle, broadcaster) else {
            report.unclassified.push(name);
            continue;
        };
        let placeholder = adapter.is_placeholder();

        match registry.register(id.clone(), adapter) {
            RegisterOutcome::Registered => {
                if placeholder {
                    report.placeholders.push(id.clone());
                }
                report.registered.push(id);
            }
            RegisterOutcome::Skipped {
                reason: SkipReason::Duplicate,
            } => report.duplicates.push(id),
            RegisterOutcome::Skipped {
                reason: SkipReason::Unclassified,
            } => report.unclassified.push(name),
        }
    }

    info!(
        registered = report.registered.len(),
        placeholders = report.placeholders.len(),
        duplicates = report.duplicates.len(),
        unclassified = report.unclassified.len(),
        "Adapter bootstrap complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::{MockDevice, MockRepository};
    use beamline_core::Capability;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn handle(device: MockDevice) -> HardwareHandle {
        HardwareHandle::new(Arc::new(device))
    }

    #[test]
    fn id_from_name_strips_slash_and_lowercases() {
        assert_eq!(derive_adapter_id(&handle(MockDevice::new("/Fast Shutter"))), "fast_shutter");
        assert_eq!(derive_adapter_id(&handle(MockDevice::new("phi"))), "phi");
    }

    #[test]
    fn username_overrides_name() {
        let device = MockDevice::new("/bl/energy_mono").with_username("Beam Energy");
        assert_eq!(derive_adapter_id(&handle(device)), "beam_energy");
    }

    #[tokio::test]
    #[traced_test]
    async fn bootstrap_summary_is_logged_once() {
        let phi = Arc::new(MockDevice::new("/phi"));
        let repository = MockRepository::new(vec![
            MockDevice::handle(&phi, &[Capability::Actuator]),
            handle(MockDevice::new("/session")),
        ]);
        let registry = AdapterRegistry::new();
        let report = bootstrap(&repository, &registry, &ChangeBroadcaster::new())
            .await
            .unwrap();
        assert_eq!(report.registered, vec!["phi"]);
        assert_eq!(report.unclassified, vec!["/session"]);

        logs_assert(|lines: &[&str]| {
            let summaries: Vec<_> = lines
                .iter()
                .filter(|line| line.contains("bootstrap complete"))
                .collect();
            match summaries.as_slice() {
                [line] if line.contains("registered=1") && line.contains("unclassified=1") => Ok(()),
                other => Err(format!("expected one bootstrap summary, got {other:?}")),
            }
        });
    }
}
