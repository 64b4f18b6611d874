//! `beamline-core`
//!
//! Shared vocabulary for the beamline control service: the capability traits
//! hardware objects implement, the handle that carries them, the snapshot
//! types clients see, and the broadcaster that fans changes out.
//!
//! ## Layers
//!
//! - **Capabilities** ([`capabilities`]): fine-grained async traits
//!   (`Motor`, `Shutter`, `NState`, ...) a hardware object may implement
//! - **Handles** ([`handle`]): [`HardwareHandle`] bags one object together
//!   with every capability it declares
//! - **Snapshots** ([`snapshot`]): the immutable [`AdapterSnapshot`] built on
//!   every read
//! - **Broadcast** ([`broadcast`]): [`ChangeBroadcaster`] delivering
//!   [`ClientEvent`]s on the `beamline_value_change` and `observersChanged`
//!   channels
//!
//! Drivers live outside this workspace; `beamline-hardware` classifies their
//! handles into adapters and `beamline-control` arbitrates who may write.

pub mod broadcast;
pub mod capabilities;
pub mod error;
pub mod handle;
pub mod snapshot;

pub use broadcast::{Channel, ChangeBroadcaster, ClientEvent, DEFAULT_BROADCAST_CAPACITY};
pub use capabilities::{
    Actuator, Beam, BeamInfo, BeamShape, CommandSpec, DataPublisher, Detector, Diffractometer,
    Energy, HardwareObject, HardwareSignal, HardwareState, MachineInfo, Motor, NState, Shutter,
};
pub use error::{HardwareError, HardwareErrorKind, HwResult};
pub use handle::{Capability, HardwareHandle};
pub use snapshot::{AdapterSnapshot, AdapterState, ValueFields};
