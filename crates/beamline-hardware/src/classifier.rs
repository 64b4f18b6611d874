//! Capability Classifier
//!
//! Picks exactly one adapter kind for a [`HardwareHandle`] by walking
//! [`PRECEDENCE`] from the most specific entry to the most generic. A handle
//! that matches several rows (a shutter that is also an actuator, a motor
//! that is also an actuator) gets the first match.
//!
//! Classification is a pure function of the declared capability set; it
//! never touches the hardware.

use beamline_core::{Capability, HardwareHandle};
use serde::{Deserialize, Serialize};

/// Adapter flavour chosen for a hardware object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Discrete positions (n-state devices and shutters)
    NState,
    /// Goniometer with phases
    Diffractometer,
    /// Tunable energy source
    Energy,
    /// Detector status
    Detector,
    /// Storage ring information
    MachineInfo,
    /// Beam definition
    Beam,
    /// Data stream publisher
    DataPublisher,
    /// Motorised axis
    Motor,
    /// Generic numeric actuator
    Actuator,
}

/// Ordered classification table: the first row whose capability list
/// intersects the handle's declared capabilities wins.
pub const PRECEDENCE: [(AdapterKind, &[Capability]); 9] = [
    (
        AdapterKind::NState,
        &[Capability::NState, Capability::Shutter],
    ),
    (AdapterKind::Diffractometer, &[Capability::Diffractometer]),
    (AdapterKind::Energy, &[Capability::Energy]),
    (AdapterKind::Detector, &[Capability::Detector]),
    (AdapterKind::MachineInfo, &[Capability::MachineInfo]),
    (AdapterKind::Beam, &[Capability::Beam]),
    (AdapterKind::DataPublisher, &[Capability::DataPublisher]),
    (AdapterKind::Motor, &[Capability::Motor]),
    (AdapterKind::Actuator, &[Capability::Actuator]),
];

/// Classify a handle, or `None` if no row matches.
pub fn classify(handle: &HardwareHandle) -> Option<AdapterKind> {
    classify_capabilities(&handle.capabilities())
}

/// Classify a bare capability set.
pub fn classify_capabilities(capabilities: &[Capability]) -> Option<AdapterKind> {
    PRECEDENCE
        .iter()
        .find(|(_, required)| required.iter().any(|cap| capabilities.contains(cap)))
        .map(|(kind, _)| *kind)
}

impl AdapterKind {
    /// Value type tag reported in snapshots.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Motor | Self::Actuator | Self::Energy => "FLOAT",
            Self::NState => "NSTATE",
            Self::Diffractometer => "DIFFRACTOMETER",
            Self::Detector => "DETECTOR",
            Self::MachineInfo => "MACHINEINFO",
            Self::Beam => "BEAM",
            Self::DataPublisher => "DATAPUBLISHER",
        }
    }

    /// Whether snapshots of this kind carry `value` and `limits`.
    pub fn is_value_bearing(&self) -> bool {
        !matches!(self, Self::Detector | Self::DataPublisher)
    }

    /// Whether the kind is inherently read only.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::MachineInfo | Self::Beam)
    }

    /// Short name for logs and the adapter table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NState => "nstate",
            Self::Diffractometer => "diffractometer",
            Self::Energy => "energy",
            Self::Detector => "detector",
            Self::MachineInfo => "machine_info",
            Self::Beam => "beam",
            Self::DataPublisher => "data_publisher",
            Self::Motor => "motor",
            Self::Actuator => "actuator",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference implementation of the precedence chain written as an
    /// explicit if/else ladder.
    fn expected(caps: &[Capability]) -> Option<AdapterKind> {
        let has = |c| caps.contains(&c);
        if has(Capability::NState) || has(Capability::Shutter) {
            Some(AdapterKind::NState)
        } else if has(Capability::Diffractometer) {
            Some(AdapterKind::Diffractometer)
        } else if has(Capability::Energy) {
            Some(AdapterKind::Energy)
        } else if has(Capability::Detector) {
            Some(AdapterKind::Detector)
        } else if has(Capability::MachineInfo) {
            Some(AdapterKind::MachineInfo)
        } else if has(Capability::Beam) {
            Some(AdapterKind::Beam)
        } else if has(Capability::DataPublisher) {
            Some(AdapterKind::DataPublisher)
        } else if has(Capability::Motor) {
            Some(AdapterKind::Motor)
        } else if has(Capability::Actuator) {
            Some(AdapterKind::Actuator)
        } else {
            None
        }
    }

    #[test]
    fn every_capability_combination_follows_precedence() {
        let all = Capability::ALL;
        for mask in 0u32..(1 << all.len()) {
            let caps: Vec<Capability> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, c)| *c)
                .collect();
            assert_eq!(
                classify_capabilities(&caps),
                expected(&caps),
                "capabilities {:?}",
                caps
            );
        }
    }

    #[test]
    fn shutter_with_actuator_is_nstate() {
        let caps = [Capability::Actuator, Capability::Shutter];
        assert_eq!(classify_capabilities(&caps), Some(AdapterKind::NState));
    }

    #[test]
    fn motor_beats_generic_actuator() {
        let caps = [Capability::Actuator, Capability::Motor];
        assert_eq!(classify_capabilities(&caps), Some(AdapterKind::Motor));
    }

    #[test]
    fn empty_set_is_unmatched() {
        assert_eq!(classify_capabilities(&[]), None);
    }

    #[test]
    fn type_tags() {
        assert_eq!(AdapterKind::Motor.type_tag(), "FLOAT");
        assert_eq!(AdapterKind::NState.type_tag(), "NSTATE");
        assert_eq!(AdapterKind::MachineInfo.type_tag(), "MACHINEINFO");
        assert!(!AdapterKind::Detector.is_value_bearing());
        assert!(AdapterKind::Beam.is_read_only());
    }
}
