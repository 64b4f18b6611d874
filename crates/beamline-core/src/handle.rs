//! Hardware Handles (Capability Bag)
//!
//! A [`HardwareHandle`] is what the hardware repository hands to the adapter
//! layer: the base [`HardwareObject`] plus every capability trait object the
//! underlying driver implements.
//!
//! # Builder Pattern
//!
//! ```rust,ignore
//! let shutter = Arc::new(SafetyShutter::new());
//!
//! let handle = HardwareHandle::new(shutter.clone())
//!     .with_shutter(shutter.clone())
//!     .with_nstate(shutter);
//! ```
//!
//! # Why Not a Single `Arc<dyn Driver>`?
//!
//! Storing each capability separately:
//! 1. Avoids runtime downcasting (no `Any` bounds)
//! 2. Makes the classifier a plain table over declared capabilities
//! 3. Lets a driver use different objects for different capabilities
//!
//! The handle only holds shared references; it never owns the hardware.

use crate::capabilities::{
    Actuator, Beam, DataPublisher, Detector, Diffractometer, Energy, HardwareObject, MachineInfo,
    Motor, NState, Shutter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags mirroring the capability traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Corresponds to [`NState`]
    NState,
    /// Corresponds to [`Shutter`]
    Shutter,
    /// Corresponds to [`Diffractometer`]
    Diffractometer,
    /// Corresponds to [`Energy`]
    Energy,
    /// Corresponds to [`Detector`]
    Detector,
    /// Corresponds to [`MachineInfo`]
    MachineInfo,
    /// Corresponds to [`Beam`]
    Beam,
    /// Corresponds to [`DataPublisher`]
    DataPublisher,
    /// Corresponds to [`Motor`]
    Motor,
    /// Corresponds to [`Actuator`]
    Actuator,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 10] = [
        Capability::NState,
        Capability::Shutter,
        Capability::Diffractometer,
        Capability::Energy,
        Capability::Detector,
        Capability::MachineInfo,
        Capability::Beam,
        Capability::DataPublisher,
        Capability::Motor,
        Capability::Actuator,
    ];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::NState => "N-State",
            Self::Shutter => "Shutter",
            Self::Diffractometer => "Diffractometer",
            Self::Energy => "Energy",
            Self::Detector => "Detector",
            Self::MachineInfo => "Machine Info",
            Self::Beam => "Beam",
            Self::DataPublisher => "Data Publisher",
            Self::Motor => "Motor",
            Self::Actuator => "Actuator",
        }
    }
}

// =============================================================================
// Hardware Handle
// =============================================================================

/// Shared reference to an external hardware object and its capabilities.
#[derive(Clone)]
pub struct HardwareHandle {
    /// Base object (name, state, commands, notifications)
    pub object: Arc<dyn HardwareObject>,

    /// NState implementation (discrete positions)
    pub nstate: Option<Arc<dyn NState>>,

    /// Shutter implementation
    pub shutter: Option<Arc<dyn Shutter>>,

    /// Diffractometer implementation
    pub diffractometer: Option<Arc<dyn Diffractometer>>,

    /// Energy implementation
    pub energy: Option<Arc<dyn Energy>>,

    /// Detector implementation
    pub detector: Option<Arc<dyn Detector>>,

    /// MachineInfo implementation
    pub machine_info: Option<Arc<dyn MachineInfo>>,

    /// Beam implementation
    pub beam: Option<Arc<dyn Beam>>,

    /// DataPublisher implementation
    pub data_publisher: Option<Arc<dyn DataPublisher>>,

    /// Motor implementation
    pub motor: Option<Arc<dyn Motor>>,

    /// Actuator implementation
    pub actuator: Option<Arc<dyn Actuator>>,
}

impl std::fmt::Debug for HardwareHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareHandle")
            .field("name", &self.object.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl HardwareHandle {
    /// Create a handle with no capabilities besides the base object.
    pub fn new(object: Arc<dyn HardwareObject>) -> Self {
        Self {
            object,
            nstate: None,
            shutter: None,
            diffractometer: None,
            energy: None,
            detector: None,
            machine_info: None,
            beam: None,
            data_publisher: None,
            motor: None,
            actuator: None,
        }
    }

    /// Repository name of the underlying object.
    pub fn name(&self) -> &str {
        self.object.name()
    }

    /// Whether the handle declares `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::NState => self.nstate.is_some(),
            Capability::Shutter => self.shutter.is_some(),
            Capability::Diffractometer => self.diffractometer.is_some(),
            Capability::Energy => self.energy.is_some(),
            Capability::Detector => self.detector.is_some(),
            Capability::MachineInfo => self.machine_info.is_some(),
            Capability::Beam => self.beam.is_some(),
            Capability::DataPublisher => self.data_publisher.is_some(),
            Capability::Motor => self.motor.is_some(),
            Capability::Actuator => self.actuator.is_some(),
        }
    }

    /// Get list of capabilities this handle declares
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|cap| self.has(*cap))
            .collect()
    }

    // Builder methods

    /// Set NState implementation
    pub fn with_nstate(mut self, n: Arc<dyn NState>) -> Self {
        self.nstate = Some(n);
        self
    }

    /// Set Shutter implementation
    pub fn with_shutter(mut self, s: Arc<dyn Shutter>) -> Self {
        self.shutter = Some(s);
        self
    }

    /// Set Diffractometer implementation
    pub fn with_diffractometer(mut self, d: Arc<dyn Diffractometer>) -> Self {
        self.diffractometer = Some(d);
        self
    }

    /// Set Energy implementation
    pub fn with_energy(mut self, e: Arc<dyn Energy>) -> Self {
        self.energy = Some(e);
        self
    }

    /// Set Detector implementation
    pub fn with_detector(mut self, d: Arc<dyn Detector>) -> Self {
        self.detector = Some(d);
        self
    }

    /// Set MachineInfo implementation
    pub fn with_machine_info(mut self, m: Arc<dyn MachineInfo>) -> Self {
        self.machine_info = Some(m);
        self
    }

    /// Set Beam implementation
    pub fn with_beam(mut self, b: Arc<dyn Beam>) -> Self {
        self.beam = Some(b);
        self
    }

    /// Set DataPublisher implementation
    pub fn with_data_publisher(mut self, p: Arc<dyn DataPublisher>) -> Self {
        self.data_publisher = Some(p);
        self
    }

    /// Set Motor implementation
    pub fn with_motor(mut self, m: Arc<dyn Motor>) -> Self {
        self.motor = Some(m);
        self
    }

    /// Set Actuator implementation
    pub fn with_actuator(mut self, a: Arc<dyn Actuator>) -> Self {
        self.actuator = Some(a);
        self
    }
}
