//! Hardware Capabilities
//!
//! Fine-grained capability traits a hardware object may implement. The
//! hardware repository hands over objects whose capability set is only known
//! at runtime; a single object frequently satisfies several traits at once
//! (a shutter is also an n-state device, a motor is also an actuator).
//!
//! - A motorised stage might implement: `HardwareObject + Motor + Actuator`
//! - A safety shutter might implement: `HardwareObject + Shutter + NState`
//! - A ring-current monitor might implement: `HardwareObject + MachineInfo`
//!
//! The [`HardwareHandle`](crate::handle::HardwareHandle) bag collects the
//! implemented traits, and the classifier in `beamline-hardware` picks one
//! adapter kind from it.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Returns [`HwResult`] so faults stay explicit
//! - Focuses on ONE thing
//!
//! Reads are never cached by callers: every getter is expected to reach the
//! device (or the driver's own up-to-date state) on each call.

use crate::error::{HardwareError, HwResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

// =============================================================================
// Shared Types
// =============================================================================

/// Lifecycle state reported by a hardware object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HardwareState {
    /// State cannot be determined
    #[default]
    Unknown,
    /// Operational but something needs attention
    Warning,
    /// Executing an action
    Busy,
    /// Idle and ready for commands
    Ready,
    /// In a fault condition
    Fault,
    /// Switched off or disabled
    Off,
}

impl HardwareState {
    /// Upper-case name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Warning => "WARNING",
            Self::Busy => "BUSY",
            Self::Ready => "READY",
            Self::Fault => "FAULT",
            Self::Off => "OFF",
        }
    }
}

impl std::fmt::Display for HardwareState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push notification emitted by a hardware object.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareSignal {
    /// The primary value changed (position, energy, n-state value, ...)
    ValueChanged(serde_json::Value),
    /// The lifecycle state changed
    StateChanged(HardwareState),
}

/// An exported command that clients may invoke by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command name
    pub name: String,
    /// Names of the expected arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Command without arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Add an argument name.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Beam shape as defined by the beam-defining optics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BeamShape {
    /// Rectangular (slits)
    Rectangular,
    /// Elliptical (aperture, focused beam)
    #[default]
    Ellipse,
    /// Unknown shape
    Unknown,
}

/// Current beam definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BeamInfo {
    /// Horizontal size in mm
    pub size_x: f64,
    /// Vertical size in mm
    pub size_y: f64,
    /// Beam shape
    pub shape: BeamShape,
    /// Label of the beam-defining element (aperture name, slit setting)
    pub label: String,
}

// =============================================================================
// Base Trait
// =============================================================================

/// Base interface every hardware object provides.
///
/// # Contract
/// - `name()` is the repository name of the object (e.g. `/phi`)
/// - `username()`, when set, is the preferred display name and overrides the
///   name when deriving the adapter id
/// - `subscribe()` is called once, when the adapter is constructed
#[async_trait]
pub trait HardwareObject: Send + Sync {
    /// Repository name of the object.
    fn name(&self) -> &str;

    /// Preferred display name, if configured.
    fn username(&self) -> Option<&str> {
        None
    }

    /// Current lifecycle state.
    async fn state(&self) -> HwResult<HardwareState>;

    /// Whether writes are forbidden on this object.
    fn read_only(&self) -> bool {
        false
    }

    /// Commands exported to clients.
    fn exported_commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Execute an exported command.
    ///
    /// # Default Implementation
    /// Returns a `NotSupported` error.
    async fn execute_command(&self, name: &str, _args: &serde_json::Value) -> HwResult<()> {
        Err(HardwareError::not_supported(&format!("command '{}'", name)))
    }

    /// Declared attribute schema, if the object exposes one.
    fn exported_attributes(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        None
    }

    /// Subscribe to push notifications.
    ///
    /// Returns `Ok(None)` for objects that never push. An `Err` means the
    /// object should have pushed but the subscription could not be set up.
    fn subscribe(&self) -> HwResult<Option<broadcast::Receiver<HardwareSignal>>> {
        Ok(None)
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Capability: Discrete State Selection
///
/// Devices that sit in one of a finite set of named positions (filters,
/// zoom levels, beamstop in/out).
#[async_trait]
pub trait NState: Send + Sync {
    /// All selectable values.
    fn values(&self) -> Vec<String>;

    /// Current value.
    async fn get_value(&self) -> HwResult<String>;

    /// Move to one of [`values`](NState::values).
    async fn set_value(&self, value: &str) -> HwResult<()>;

    /// Interrupt a transition in progress.
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> HwResult<()> {
        Err(HardwareError::not_supported("stop"))
    }
}

/// Capability: Shutter Control
///
/// # Safety
/// CAUTION: Always verify shutter state before assuming beam is blocked.
/// Use hardware interlocks for safety, never rely on software alone.
#[async_trait]
pub trait Shutter: Send + Sync {
    /// Open the shutter.
    async fn open(&self) -> HwResult<()>;

    /// Close the shutter.
    async fn close(&self) -> HwResult<()>;

    /// Query whether the shutter is open.
    async fn is_open(&self) -> HwResult<bool>;
}

/// Capability: Diffractometer
///
/// Sample goniometers with named operating phases
/// (centring, data collection, beam location, transfer).
#[async_trait]
pub trait Diffractometer: Send + Sync {
    /// Available phases.
    fn phases(&self) -> Vec<String>;

    /// Current phase.
    async fn current_phase(&self) -> HwResult<String>;

    /// Switch phase. May block while axes move.
    async fn set_phase(&self, phase: &str) -> HwResult<()>;
}

/// Capability: Energy Source
///
/// Tunable X-ray energy (monochromator + undulator). Energy is in keV.
#[async_trait]
pub trait Energy: Send + Sync {
    /// Current energy.
    async fn get_energy(&self) -> HwResult<f64>;

    /// Tune to `energy_kev`. May block while tuning.
    async fn set_energy(&self, energy_kev: f64) -> HwResult<()>;

    /// Energy range; `None` bounds are not configured.
    async fn energy_limits(&self) -> HwResult<(Option<f64>, Option<f64>)>;

    /// Abort tuning.
    async fn stop(&self) -> HwResult<()> {
        Err(HardwareError::not_supported("stop"))
    }
}

/// Capability: Detector
#[async_trait]
pub trait Detector: Send + Sync {
    /// Status text describing the detector condition (armed, idle, ...).
    async fn status_message(&self) -> HwResult<String>;
}

/// Capability: Machine Information
///
/// Storage ring information (current, fill mode, operator message). Read only.
#[async_trait]
pub trait MachineInfo: Send + Sync {
    /// Current machine values keyed by name.
    async fn machine_values(&self) -> HwResult<BTreeMap<String, serde_json::Value>>;
}

/// Capability: Beam Definition. Read only.
#[async_trait]
pub trait Beam: Send + Sync {
    /// Current beam size and shape.
    async fn beam_info(&self) -> HwResult<BeamInfo>;
}

/// Capability: Data Publishing
///
/// Objects that publish data streams (plots, live processing results) to
/// clients through their own channels.
pub trait DataPublisher: Send + Sync {
    /// Names of the currently published channels.
    fn channels(&self) -> Vec<String>;
}

/// Capability: Motion Control
///
/// Devices that move to positions (goniometer axes, slits, translation stages).
///
/// # Contract
/// - Positions are in device-native units (typically mm or degrees)
/// - `move_abs` may return before motion completes
/// - `stop` halts motion immediately
#[async_trait]
pub trait Motor: Send + Sync {
    /// Move to absolute position.
    async fn move_abs(&self, position: f64) -> HwResult<()>;

    /// Current position (may be approximate while moving).
    async fn position(&self) -> HwResult<f64>;

    /// Travel limits; `None` bounds are not configured.
    async fn motor_limits(&self) -> HwResult<(Option<f64>, Option<f64>)>;

    /// Stop motion immediately.
    async fn stop(&self) -> HwResult<()>;
}

/// Capability: Generic Actuator
///
/// Any object with a single settable floating point value (attenuation,
/// flux, aperture diameter, ...).
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Current value.
    async fn get_value(&self) -> HwResult<f64>;

    /// Set a new value.
    async fn set_value(&self, value: f64) -> HwResult<()>;

    /// Limits; `None` bounds are not configured.
    ///
    /// # Default Implementation
    /// Reports both bounds as not configured.
    async fn get_limits(&self) -> HwResult<(Option<f64>, Option<f64>)> {
        Ok((None, None))
    }

    /// Interrupt a change in progress.
    async fn stop(&self) -> HwResult<()> {
        Err(HardwareError::not_supported("stop"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wire_names() {
        assert_eq!(HardwareState::Ready.as_str(), "READY");
        assert_eq!(
            serde_json::to_value(HardwareState::Busy).unwrap(),
            serde_json::json!("BUSY")
        );
    }

    #[test]
    fn command_spec_builder() {
        let cmd = CommandSpec::new("set_phase").with_arg("phase");
        assert_eq!(cmd.name, "set_phase");
        assert_eq!(cmd.args, vec!["phase".to_string()]);
    }
}
