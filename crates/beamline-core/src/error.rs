//! Fault types raised below the adapter boundary.
//!
//! Every capability call on a hardware object returns [`HwResult`]. The
//! adapter layer never lets a [`HardwareError`] escape to clients: read faults
//! become degraded snapshots and write faults become `UNUSABLE` snapshots.
//! Keeping the fault explicit (rather than panicking or returning sentinel
//! values) lets the snapshot builder decide how each kind is represented.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Hardware Errors
// =============================================================================

/// Category of a hardware fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareErrorKind {
    /// A client-supplied value could not be converted to what the device expects
    Conversion,
    /// A value lies outside the device limits
    OutOfRange,
    /// The device refused the request (interlock, wrong state, ...)
    Rejected,
    /// Communication with the device failed
    Communication,
    /// The device did not answer in time
    Timeout,
    /// The operation is not implemented by this hardware object
    NotSupported,
    /// The hardware object is read only
    ReadOnly,
    /// A running action was aborted or cancelled
    Interrupted,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for HardwareErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HardwareErrorKind::Conversion => "conversion",
            HardwareErrorKind::OutOfRange => "out_of_range",
            HardwareErrorKind::Rejected => "rejected",
            HardwareErrorKind::Communication => "communication",
            HardwareErrorKind::Timeout => "timeout",
            HardwareErrorKind::NotSupported => "not_supported",
            HardwareErrorKind::ReadOnly => "read_only",
            HardwareErrorKind::Interrupted => "interrupted",
            HardwareErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// A fault reported by a hardware object.
///
/// The `Display` output is the human-readable message shown to clients in
/// the `msg` field of a degraded snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct HardwareError {
    /// Fault category
    pub kind: HardwareErrorKind,
    /// Human-readable description
    pub message: String,
}

/// Convenience alias for results of capability calls.
pub type HwResult<T> = std::result::Result<T, HardwareError>;

impl HardwareError {
    /// Create an error of an arbitrary kind.
    pub fn new(kind: HardwareErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Value conversion failed.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Conversion, message)
    }

    /// Value outside `[min, max]`.
    pub fn out_of_range(value: f64, min: f64, max: f64) -> Self {
        Self::new(
            HardwareErrorKind::OutOfRange,
            format!("Value {} outside limits ({}, {})", value, min, max),
        )
    }

    /// The device refused the request.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Rejected, message)
    }

    /// Communication failure.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Communication, message)
    }

    /// Operation not implemented by the hardware object.
    pub fn not_supported(operation: &str) -> Self {
        Self::new(
            HardwareErrorKind::NotSupported,
            format!("{} not supported by this hardware object", operation),
        )
    }

    /// Write attempted on a read-only object.
    pub fn read_only(name: &str) -> Self {
        Self::new(
            HardwareErrorKind::ReadOnly,
            format!("{} is read only", name),
        )
    }

    /// Action interrupted (abort/cancel).
    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(HardwareErrorKind::Interrupted, message)
    }
}
