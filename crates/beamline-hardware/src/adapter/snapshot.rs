//! Centralised fault-to-snapshot mapping.
//!
//! Every read an adapter performs for a snapshot reports its outcome here.
//! The builder decides how each fault degrades the snapshot, so the rules
//! live in one place:
//!
//! | Failing read        | Effect                                                        |
//! |---------------------|---------------------------------------------------------------|
//! | state / msg         | state `UNKNOWN`, msg `Exception: ..`, type `FLOAT`, unavailable, no commands/attributes |
//! | value / limits      | value `0`, limits `(0, 0)`, type `FLOAT`, msg `Exception ..`, unavailable |
//! | write (after build) | state `UNUSABLE`, msg = fault text, unavailable               |

use beamline_core::{AdapterSnapshot, AdapterState, CommandSpec, HardwareError, ValueFields};

/// Accumulates the reads of one snapshot.
#[derive(Debug)]
pub(crate) struct SnapshotBuilder {
    name: String,
    value_type: &'static str,
    read_only: bool,
    commands: Vec<CommandSpec>,
    attributes: serde_json::Map<String, serde_json::Value>,
    state: AdapterState,
    msg: String,
    value: Option<ValueFields>,
    base_fault: Option<String>,
    value_fault: Option<String>,
}

impl SnapshotBuilder {
    pub(crate) fn new(name: &str, value_type: &'static str, read_only: bool) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            read_only,
            commands: Vec::new(),
            attributes: serde_json::Map::new(),
            state: AdapterState::Unknown,
            msg: String::new(),
            value: None,
            base_fault: None,
            value_fault: None,
        }
    }

    pub(crate) fn commands(mut self, commands: Vec<CommandSpec>) -> Self {
        self.commands = commands;
        self
    }

    pub(crate) fn attributes(
        mut self,
        attributes: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Self {
        self.attributes = attributes.unwrap_or_default();
        self
    }

    /// Record the outcome of the state read.
    pub(crate) fn state(&mut self, result: Result<AdapterState, HardwareError>) {
        match result {
            Ok(state) => self.state = state,
            Err(e) => self.base_fault(&e),
        }
    }

    /// Record the outcome of the message read.
    pub(crate) fn msg(&mut self, result: Result<String, HardwareError>) {
        match result {
            Ok(msg) => self.msg = msg,
            Err(e) => self.base_fault(&e),
        }
    }

    /// Record the outcome of the value and limits reads.
    pub(crate) fn value(&mut self, result: Result<ValueFields, HardwareError>) {
        match result {
            Ok(fields) => self.value = Some(fields),
            Err(e) => {
                self.value = Some(ValueFields {
                    value: serde_json::json!(0),
                    limits: (0.0, 0.0),
                });
                if self.value_fault.is_none() {
                    self.value_fault = Some(e.to_string());
                }
            }
        }
    }

    /// Replace the snapshot for a failed base read. Only the first fault is kept.
    pub(crate) fn base_fault(&mut self, error: &HardwareError) {
        if self.base_fault.is_none() {
            self.base_fault = Some(error.to_string());
        }
    }

    /// Whether any read failed.
    pub(crate) fn is_degraded(&self) -> bool {
        self.base_fault.is_some() || self.value_fault.is_some()
    }

    pub(crate) fn build(self) -> AdapterSnapshot {
        if let Some(fault) = self.base_fault {
            return AdapterSnapshot {
                name: self.name,
                state: AdapterState::Unknown,
                msg: format!("Exception: {}", fault),
                value_type: "FLOAT".to_string(),
                available: false,
                read_only: false,
                commands: Vec::new(),
                attributes: serde_json::Map::new(),
                value: self.value,
            };
        }

        let mut snapshot = AdapterSnapshot {
            name: self.name,
            state: self.state,
            msg: self.msg,
            value_type: self.value_type.to_string(),
            available: true,
            read_only: self.read_only,
            commands: self.commands,
            attributes: self.attributes,
            value: self.value,
        };

        if let Some(fault) = self.value_fault {
            snapshot.state = AdapterState::Unknown;
            snapshot.available = false;
            snapshot.value_type = "FLOAT".to_string();
            snapshot.msg = format!("Exception {}", fault);
        }

        snapshot
    }
}

/// Mark a snapshot as describing a failed write.
pub(crate) fn mark_unusable(snapshot: &mut AdapterSnapshot, error: &HardwareError) {
    snapshot.state = AdapterState::Unusable;
    snapshot.available = false;
    snapshot.msg = if error.message.is_empty() {
        format!("{} error", error.kind)
    } else {
        error.to_string()
    };
}
