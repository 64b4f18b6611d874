//! Hardware Object Adapters
//!
//! An [`Adapter`] is the per-object bridge between one external hardware
//! object and the clients. It gives every object the same surface
//! (identify, state, value, limits, stop, commands, attributes, snapshot)
//! regardless of which capabilities the object implements.
//!
//! # Fault Boundary
//!
//! Hardware faults never cross the adapter:
//! - reads that feed a snapshot degrade it (see [`SnapshotBuilder`])
//! - writes (`set_value`, `stop`, `execute_command`) always return a
//!   snapshot, with state `UNUSABLE` and the fault text on failure
//!
//! Only the explicit accessors [`Adapter::get_value`] and [`Adapter::limits`]
//! return `Result`, for callers that need the raw value.
//!
//! # Push Relay
//!
//! At construction the adapter subscribes to the object's push
//! notifications and spawns a relay task:
//! - value changes are re-emitted as `{name, value}`
//! - state changes are re-emitted as the full snapshot
//!
//! The relay holds only a weak reference to its adapter and is aborted when
//! the adapter is dropped.
//!
//! [`SnapshotBuilder`]: snapshot::SnapshotBuilder

mod kinds;
pub(crate) mod snapshot;

use crate::classifier::{classify, AdapterKind};
use beamline_core::{
    AdapterSnapshot, AdapterState, ChangeBroadcaster, Channel, CommandSpec, HardwareError,
    HardwareHandle, HardwareSignal, HwResult, ValueFields,
};
use parking_lot::Mutex;
use serde::Serialize;
use snapshot::{mark_unusable, SnapshotBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Payload of a value change event.
#[derive(Debug, Clone, Serialize)]
pub struct ValueChange<'a> {
    /// Adapter id
    pub name: &'a str,
    /// New value
    pub value: &'a serde_json::Value,
}

/// Uniform bridge to one hardware object.
pub struct Adapter {
    id: String,
    kind: AdapterKind,
    handle: HardwareHandle,
    available: AtomicBool,
    read_only: bool,
    /// Set when construction failed; the adapter then never touches the hardware
    construction_fault: Option<String>,
    broadcaster: ChangeBroadcaster,
    relay: Mutex<Option<AbortHandle>>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("object", &self.handle.name())
            .field("available", &self.available())
            .field("read_only", &self.read_only)
            .field("placeholder", &self.is_placeholder())
            .finish()
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if let Some(relay) = self.relay.get_mut().take() {
            relay.abort();
            debug!(adapter_id = %self.id, "Push relay aborted");
        }
    }
}

impl Adapter {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Classify `handle` and build its adapter.
    ///
    /// Returns `None` (after logging) when no adapter kind matches. When the
    /// adapter itself cannot be constructed an unavailable placeholder is
    /// returned under the same id.
    pub fn create(
        id: impl Into<String>,
        handle: HardwareHandle,
        broadcaster: &ChangeBroadcaster,
    ) -> Option<Arc<Self>> {
        let id = id.into();
        let Some(kind) = classify(&handle) else {
            warn!(
                adapter_id = %id,
                object = %handle.name(),
                capabilities = ?handle.capabilities(),
                "No adapter matches hardware object, skipping"
            );
            return None;
        };

        match Self::new(id.clone(), kind, handle.clone(), broadcaster.clone()) {
            Ok(adapter) => Some(adapter),
            Err(e) => {
                error!(
                    adapter_id = %id,
                    kind = %kind,
                    error = %e,
                    "Failed to construct adapter, registering unavailable placeholder"
                );
                Some(Self::placeholder(id, kind, handle, broadcaster.clone(), e))
            }
        }
    }

    /// Build an adapter of a known kind and start its push relay.
    ///
    /// # Errors
    /// Fails when the object refuses the push subscription or when called
    /// outside a Tokio runtime while the object pushes notifications.
    pub fn new(
        id: String,
        kind: AdapterKind,
        handle: HardwareHandle,
        broadcaster: ChangeBroadcaster,
    ) -> HwResult<Arc<Self>> {
        let signals = handle.object.subscribe()?;
        let runtime = match signals {
            Some(_) => Some(Handle::try_current().map_err(|e| {
                HardwareError::communication(format!("cannot start push relay: {}", e))
            })?),
            None => None,
        };

        let read_only = handle.object.read_only() || kind.is_read_only();
        let adapter = Arc::new(Self {
            id,
            kind,
            handle,
            available: AtomicBool::new(true),
            read_only,
            construction_fault: None,
            broadcaster,
            relay: Mutex::new(None),
        });

        if let (Some(rx), Some(runtime)) = (signals, runtime) {
            let task = runtime.spawn(relay_signals(Arc::downgrade(&adapter), rx));
            *adapter.relay.lock() = Some(task.abort_handle());
        }

        Ok(adapter)
    }

    fn placeholder(
        id: String,
        kind: AdapterKind,
        handle: HardwareHandle,
        broadcaster: ChangeBroadcaster,
        fault: HardwareError,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            handle,
            available: AtomicBool::new(false),
            read_only: true,
            construction_fault: Some(fault.to_string()),
            broadcaster,
            relay: Mutex::new(None),
        })
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Stable adapter id.
    pub fn identify(&self) -> &str {
        &self.id
    }

    /// Adapter kind chosen at classification.
    pub fn kind(&self) -> AdapterKind {
        self.kind
    }

    /// Underlying hardware handle.
    pub fn handle(&self) -> &HardwareHandle {
        &self.handle
    }

    /// Whether the last read succeeded.
    pub fn available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Whether writes are refused.
    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Whether this adapter stands in for one that failed to construct.
    pub fn is_placeholder(&self) -> bool {
        self.construction_fault.is_some()
    }

    /// Exported commands.
    pub fn commands(&self) -> Vec<CommandSpec> {
        if self.is_placeholder() {
            return Vec::new();
        }
        self.handle.object.exported_commands()
    }

    /// Declared attribute schema; empty unless the object exposes one.
    pub fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        if self.is_placeholder() {
            return serde_json::Map::new();
        }
        self.handle.object.exported_attributes().unwrap_or_default()
    }

    fn construction_error(&self) -> Option<HardwareError> {
        self.construction_fault
            .as_ref()
            .map(|fault| HardwareError::communication(fault.clone()))
    }

    fn mark_unavailable(&self, error: &HardwareError) {
        if self.available.swap(false, Ordering::SeqCst) {
            warn!(adapter_id = %self.id, error = %error, "Hardware object became unavailable");
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current state; `UNKNOWN` (and unavailable) on any fault.
    pub async fn state(&self) -> AdapterState {
        if self.is_placeholder() {
            return AdapterState::Unknown;
        }
        match self.handle.object.state().await {
            Ok(state) => state.into(),
            Err(e) => {
                self.mark_unavailable(&e);
                AdapterState::Unknown
            }
        }
    }

    /// Message describing the current state; the fault text on failure.
    pub async fn msg(&self) -> String {
        if let Some(e) = self.construction_error() {
            return format!("Exception: {}", e);
        }
        match kinds::read_msg(self.kind, &self.handle).await {
            Ok(msg) => msg,
            Err(e) => {
                self.mark_unavailable(&e);
                format!("Exception: {}", e)
            }
        }
    }

    /// Current value (read-through, never cached).
    pub async fn get_value(&self) -> HwResult<serde_json::Value> {
        if let Some(e) = self.construction_error() {
            return Err(e);
        }
        kinds::read_value(self.kind, &self.handle).await
    }

    /// `(min, max)` limits.
    ///
    /// Returns `(0, 0)` when either bound is not configured. Any other
    /// retrieval fault is returned as an error.
    pub async fn limits(&self) -> HwResult<(f64, f64)> {
        if let Some(e) = self.construction_error() {
            return Err(e);
        }
        match kinds::read_limits(self.kind, &self.handle).await? {
            (Some(min), Some(max)) => Ok((min, max)),
            _ => Ok((0.0, 0.0)),
        }
    }

    async fn value_fields(&self) -> HwResult<ValueFields> {
        let value = self.get_value().await?;
        let limits = self.limits().await?;
        Ok(ValueFields { value, limits })
    }

    /// Build a fresh snapshot from live reads.
    ///
    /// Never fails: faulting reads degrade the snapshot and mark the adapter
    /// unavailable. A clean read makes it available again.
    pub async fn to_snapshot(&self) -> AdapterSnapshot {
        let mut builder = SnapshotBuilder::new(&self.id, self.kind.type_tag(), self.read_only)
            .commands(self.commands())
            .attributes(Some(self.attributes()));

        if let Some(e) = self.construction_error() {
            builder.base_fault(&e);
            if self.kind.is_value_bearing() {
                builder.value(Err(e));
            }
            return builder.build();
        }

        builder.state(
            self.handle
                .object
                .state()
                .await
                .map(AdapterState::from),
        );
        builder.msg(kinds::read_msg(self.kind, &self.handle).await);
        if self.kind.is_value_bearing() {
            builder.value(self.value_fields().await);
        }

        let degraded = builder.is_degraded();
        let snapshot = builder.build();
        if degraded {
            warn!(adapter_id = %self.id, msg = %snapshot.msg, "Degraded snapshot");
            self.available.store(false, Ordering::SeqCst);
        } else if !self.available.swap(true, Ordering::SeqCst) {
            info!(adapter_id = %self.id, "Hardware object available again");
        }
        snapshot
    }

    // =========================================================================
    // Writes
    // =========================================================================

    async fn outcome(&self, action: &str, result: HwResult<()>) -> AdapterSnapshot {
        match result {
            Ok(()) => self.to_snapshot().await,
            Err(e) => {
                error!(adapter_id = %self.id, action, error = %e, "Error setting beamline attribute");
                let mut snapshot = self.to_snapshot().await;
                mark_unusable(&mut snapshot, &e);
                self.available.store(false, Ordering::SeqCst);
                snapshot
            }
        }
    }

    /// Write a new value.
    ///
    /// Always returns a snapshot. Conversion, range, read-only and hardware
    /// faults produce state `UNUSABLE` with the fault text in `msg`.
    pub async fn set_value(&self, value: serde_json::Value) -> AdapterSnapshot {
        let result = if let Some(e) = self.construction_error() {
            Err(e)
        } else if self.read_only {
            Err(HardwareError::read_only(&self.id))
        } else {
            debug!(adapter_id = %self.id, %value, "set_value");
            kinds::write_value(self.kind, &self.handle, &value).await
        };
        self.outcome("set_value", result).await
    }

    /// Halt the action in progress.
    pub async fn stop(&self) -> AdapterSnapshot {
        let result = match self.construction_error() {
            Some(e) => Err(e),
            None => kinds::stop(self.kind, &self.handle).await,
        };
        self.outcome("stop", result).await
    }

    /// Run an exported command.
    pub async fn execute_command(&self, name: &str, args: serde_json::Value) -> AdapterSnapshot {
        let result = if let Some(e) = self.construction_error() {
            Err(e)
        } else if !self.commands().iter().any(|cmd| cmd.name == name) {
            Err(HardwareError::not_supported(&format!("command '{}'", name)))
        } else {
            debug!(adapter_id = %self.id, command = name, "execute_command");
            self.handle.object.execute_command(name, &args).await
        };
        self.outcome("execute_command", result).await
    }

    // =========================================================================
    // Change Events
    // =========================================================================

    /// Emit `{name, value}` on `beamline_value_change`.
    pub fn emit_value_change(&self, value: &serde_json::Value) {
        self.broadcaster.broadcast(
            Channel::BeamlineValueChange,
            &ValueChange {
                name: &self.id,
                value,
            },
        );
    }

    /// Emit the full snapshot on `beamline_value_change`.
    pub async fn emit_state_change(&self) {
        let snapshot = self.to_snapshot().await;
        self.broadcaster
            .broadcast(Channel::BeamlineValueChange, &snapshot);
    }
}

async fn relay_signals(adapter: Weak<Adapter>, mut rx: broadcast::Receiver<HardwareSignal>) {
    loop {
        let signal = match rx.recv().await {
            Ok(signal) => signal,
            Err(RecvError::Lagged(n)) => {
                if let Some(adapter) = adapter.upgrade() {
                    warn!(adapter_id = %adapter.id, skipped = n, "Push relay lagged");
                }
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(adapter) = adapter.upgrade() else {
            break;
        };
        match signal {
            HardwareSignal::ValueChanged(value) => adapter.emit_value_change(&value),
            HardwareSignal::StateChanged(_) => adapter.emit_state_change().await,
        }
    }
}
