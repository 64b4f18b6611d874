//! Adapter Registry
//!
//! Process-wide map from adapter id to [`Adapter`]. The registry is created
//! once at startup and shared (`Arc<AdapterRegistry>`) with every consumer.
//!
//! # Invariants
//!
//! - Ids are unique: the first registration wins, later ones are logged and
//!   dropped without overwriting
//! - Append only: there is no removal path, adapters live for the process
//!   lifetime

use crate::adapter::Adapter;
use crate::classifier::AdapterKind;
use beamline_core::{AdapterSnapshot, ChangeBroadcaster, HardwareHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a registration did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An adapter with the same id already exists
    Duplicate,
    /// No adapter kind matches the hardware object
    Unclassified,
}

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The adapter is now reachable under its id
    Registered,
    /// The adapter was dropped
    Skipped {
        /// Why
        reason: SkipReason,
    },
}

/// One row of the adapter table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterInfo {
    /// Adapter id
    pub id: String,
    /// Adapter kind
    pub kind: AdapterKind,
    /// Repository name of the hardware object
    pub object: String,
    /// Whether the adapter is a placeholder for a failed construction
    pub placeholder: bool,
}

/// Central registry of adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<String, Arc<Adapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under `id` unless the id is taken.
    pub fn register(&self, id: impl Into<String>, adapter: Arc<Adapter>) -> RegisterOutcome {
        let id = id.into();
        match self.adapters.entry(id) {
            Entry::Occupied(existing) => {
                warn!(
                    adapter_id = %existing.key(),
                    existing = %existing.get().handle().name(),
                    rejected = %adapter.handle().name(),
                    "Duplicate adapter id, skipping registration"
                );
                RegisterOutcome::Skipped {
                    reason: SkipReason::Duplicate,
                }
            }
            Entry::Vacant(slot) => {
                debug!(adapter_id = %slot.key(), kind = %adapter.kind(), "Adapter registered");
                slot.insert(adapter);
                RegisterOutcome::Registered
            }
        }
    }

    /// Build and register an adapter for an attribute of an existing one.
    ///
    /// The nested id is `"{parent}.{attr}"`; the same uniqueness rule applies.
    pub fn register_nested(
        &self,
        parent: &str,
        attr: &str,
        handle: HardwareHandle,
        broadcaster: &ChangeBroadcaster,
    ) -> RegisterOutcome {
        let id = format!("{}.{}", parent, attr);
        if self.contains(&id) {
            warn!(adapter_id = %id, "Duplicate nested adapter id, skipping registration");
            return RegisterOutcome::Skipped {
                reason: SkipReason::Duplicate,
            };
        }
        match Adapter::create(id.clone(), handle, broadcaster) {
            Some(adapter) => self.register(id, adapter),
            None => RegisterOutcome::Skipped {
                reason: SkipReason::Unclassified,
            },
        }
    }

    /// Look up an adapter by id.
    pub fn lookup(&self, id: &str) -> Option<Arc<Adapter>> {
        self.adapters.get(id).map(|entry| entry.value().clone())
    }

    /// Check if an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.adapters.contains_key(id)
    }

    /// Adapter table sorted by id.
    pub fn list(&self) -> Vec<AdapterInfo> {
        let mut rows: Vec<AdapterInfo> = self
            .adapters
            .iter()
            .map(|entry| AdapterInfo {
                id: entry.key().clone(),
                kind: entry.value().kind(),
                object: entry.value().handle().name().to_string(),
                placeholder: entry.value().is_placeholder(),
            })
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    /// Fresh snapshots of every adapter, sorted by id.
    ///
    /// This is the full-state fetch clients use to reconcile after missing
    /// broadcast events.
    pub async fn snapshot_all(&self) -> Vec<AdapterSnapshot> {
        let mut adapters: Vec<Arc<Adapter>> = self
            .adapters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        adapters.sort_by(|a, b| a.identify().cmp(b.identify()));

        let mut snapshots = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            snapshots.push(adapter.to_snapshot().await);
        }
        snapshots
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter is registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::MockDevice;
    use beamline_core::Capability;
    use serde_json::json;
    use tracing_test::traced_test;

    fn adapter(name: &str, id: &str, broadcaster: &ChangeBroadcaster) -> Arc<Adapter> {
        let device = Arc::new(MockDevice::new(name));
        Adapter::create(
            id,
            MockDevice::handle(&device, &[Capability::Actuator]),
            broadcaster,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let broadcaster = ChangeBroadcaster::new();
        let registry = AdapterRegistry::new();

        let first = adapter("/flux", "flux", &broadcaster);
        let second = adapter("/Flux", "flux", &broadcaster);

        assert_eq!(registry.register("flux", first), RegisterOutcome::Registered);
        assert_eq!(
            registry.register("flux", second),
            RegisterOutcome::Skipped {
                reason: SkipReason::Duplicate
            }
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("flux").unwrap().handle().name(), "/flux");
    }

    #[tokio::test]
    #[traced_test]
    async fn duplicate_skip_is_logged() {
        let broadcaster = ChangeBroadcaster::new();
        let registry = AdapterRegistry::new();
        registry.register("flux", adapter("/flux", "flux", &broadcaster));
        registry.register("flux", adapter("/flux2", "flux", &broadcaster));

        assert!(logs_contain("Duplicate adapter id, skipping registration"));
        assert!(logs_contain("/flux2"));
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let broadcaster = ChangeBroadcaster::new();
        let registry = AdapterRegistry::new();
        registry.register("zoom", adapter("/zoom", "zoom", &broadcaster));
        registry.register("aperture", adapter("/aperture", "aperture", &broadcaster));

        let ids: Vec<String> = registry.list().into_iter().map(|row| row.id).collect();
        assert_eq!(ids, vec!["aperture", "zoom"]);
        assert!(registry.lookup("missing").is_none());
    }

    #[tokio::test]
    async fn nested_adapters_use_dotted_ids() {
        let broadcaster = ChangeBroadcaster::new();
        let registry = AdapterRegistry::new();

        let offset = Arc::new(MockDevice::new("/detector/offset").with_value(json!(2.0)));
        let handle = MockDevice::handle(&offset, &[Capability::Actuator]);
        let outcome = registry.register_nested("detector", "offset", handle.clone(), &broadcaster);
        assert_eq!(outcome, RegisterOutcome::Registered);
        assert!(registry.contains("detector.offset"));

        let again = registry.register_nested("detector", "offset", handle, &broadcaster);
        assert_eq!(
            again,
            RegisterOutcome::Skipped {
                reason: SkipReason::Duplicate
            }
        );
    }

    #[tokio::test]
    async fn snapshot_all_reads_every_adapter() {
        let broadcaster = ChangeBroadcaster::new();
        let registry = AdapterRegistry::new();
        registry.register("b", adapter("/b", "b", &broadcaster));
        registry.register("a", adapter("/a", "a", &broadcaster));

        let names: Vec<String> = registry
            .snapshot_all()
            .await
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
