//! `beamline-hardware`
//!
//! The hardware capability adapter layer: turns heterogeneous hardware
//! objects into uniform [`Adapter`]s reachable by id.
//!
//! - [`classifier`]: picks one [`AdapterKind`] per handle from the
//!   [`PRECEDENCE`] table
//! - [`adapter`]: the per-object bridge; hardware faults become degraded
//!   snapshots instead of errors
//! - [`registry`]: the process-wide, append-only id → adapter map
//! - [`repository`]: one-shot enumeration of the hardware repository at
//!   startup
//! - [`drivers::mock`]: in-memory hardware objects
//!
//! ## Example
//!
//! ```rust,ignore
//! let broadcaster = ChangeBroadcaster::new();
//! let registry = AdapterRegistry::new();
//! let report = bootstrap(&repository, &registry, &broadcaster).await?;
//!
//! let phi = registry.lookup("phi").expect("registered");
//! let snapshot = phi.set_value(json!(42.0)).await;
//! ```

pub mod adapter;
pub mod classifier;
pub mod drivers;
pub mod registry;
pub mod repository;

pub use adapter::{Adapter, ValueChange};
pub use classifier::{classify, classify_capabilities, AdapterKind, PRECEDENCE};
pub use registry::{AdapterInfo, AdapterRegistry, RegisterOutcome, SkipReason};
pub use repository::{bootstrap, derive_adapter_id, BootstrapReport, HardwareRepository, StartupError};
