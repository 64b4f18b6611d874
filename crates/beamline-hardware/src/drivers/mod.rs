//! Hardware object implementations shipped with the service.
//!
//! Real beamline drivers live in the facility's hardware repository and are
//! handed over as [`HardwareHandle`](beamline_core::HardwareHandle)s. The mock
//! objects here stand in for them in tests and demo deployments.

pub mod mock;
