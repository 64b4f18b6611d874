//! Adapter snapshot wire types.
//!
//! A snapshot is built fresh for every read and never cached. Its JSON shape is
//! what clients consume on `beamline_value_change` and full-state fetches:
//!
//! ```json
//! {"name": "phi", "state": "READY", "msg": "", "type": "FLOAT",
//!  "available": true, "readonly": false, "commands": [], "attributes": {},
//!  "value": 12.5, "limits": [-180.0, 180.0]}
//! ```

use crate::capabilities::{CommandSpec, HardwareState};
use serde::{Deserialize, Serialize};

/// State reported to clients.
///
/// Superset of [`HardwareState`] with `UNUSABLE`, which only the adapter
/// layer produces (after a failed write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterState {
    /// Could not be determined
    #[default]
    Unknown,
    /// Operational with warnings
    Warning,
    /// Executing an action
    Busy,
    /// Idle
    Ready,
    /// Fault condition
    Fault,
    /// Switched off
    Off,
    /// Last write failed; the message explains why
    Unusable,
}

impl AdapterState {
    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Warning => "WARNING",
            Self::Busy => "BUSY",
            Self::Ready => "READY",
            Self::Fault => "FAULT",
            Self::Off => "OFF",
            Self::Unusable => "UNUSABLE",
        }
    }
}

impl From<HardwareState> for AdapterState {
    fn from(state: HardwareState) -> Self {
        match state {
            HardwareState::Unknown => Self::Unknown,
            HardwareState::Warning => Self::Warning,
            HardwareState::Busy => Self::Busy,
            HardwareState::Ready => Self::Ready,
            HardwareState::Fault => Self::Fault,
            HardwareState::Off => Self::Off,
        }
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra fields carried by value-bearing adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueFields {
    /// Current value (number for numeric kinds, string for n-state, object
    /// for structured kinds)
    pub value: serde_json::Value,
    /// `(min, max)`; `(0, 0)` when bounds are not configured
    pub limits: (f64, f64),
}

/// Immutable, point-in-time view of one adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSnapshot {
    /// Adapter id
    pub name: String,
    /// Current state
    pub state: AdapterState,
    /// Human-readable message; fault text when degraded
    pub msg: String,
    /// Value type tag (`FLOAT`, `NSTATE`, ...)
    #[serde(rename = "type")]
    pub value_type: String,
    /// Whether the underlying object answered the last read
    pub available: bool,
    /// Whether writes are refused
    #[serde(rename = "readonly")]
    pub read_only: bool,
    /// Exported commands
    pub commands: Vec<CommandSpec>,
    /// Declared attribute schema (empty unless the object exposes one)
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Value and limits, for value-bearing adapters
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueFields>,
}

impl AdapterSnapshot {
    /// Whether this snapshot describes a failed write.
    pub fn is_unusable(&self) -> bool {
        self.state == AdapterState::Unusable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Option<ValueFields>) -> AdapterSnapshot {
        AdapterSnapshot {
            name: "phi".into(),
            state: AdapterState::Ready,
            msg: String::new(),
            value_type: "FLOAT".into(),
            available: true,
            read_only: false,
            commands: vec![],
            attributes: serde_json::Map::new(),
            value,
        }
    }

    #[test]
    fn serializes_wire_field_names() {
        let json = serde_json::to_value(snapshot(Some(ValueFields {
            value: json!(12.5),
            limits: (-180.0, 180.0),
        })))
        .unwrap();

        assert_eq!(json["type"], "FLOAT");
        assert_eq!(json["readonly"], false);
        assert_eq!(json["state"], "READY");
        assert_eq!(json["value"], 12.5);
        assert_eq!(json["limits"], json!([-180.0, 180.0]));
    }

    #[test]
    fn omits_value_fields_for_plain_adapters() {
        let json = serde_json::to_value(snapshot(None)).unwrap();
        assert!(json.get("value").is_none());
        assert!(json.get("limits").is_none());
    }

    #[test]
    fn unusable_is_adapter_only() {
        assert_eq!(AdapterState::from(HardwareState::Fault), AdapterState::Fault);
        assert_eq!(AdapterState::Unusable.to_string(), "UNUSABLE");
    }
}
