//! Mock Hardware Objects
//!
//! Simulated hardware objects for testing and for running the service
//! without a beamline. A single [`MockDevice`] implements every capability
//! trait; [`MockDevice::handle`] decides which of them the resulting
//! [`HardwareHandle`] declares, so any capability combination can be built.
//!
//! # Fault Injection
//!
//! - [`MockDevice::fail_reads`]: every read returns a communication fault
//! - [`MockDevice::fail_limits`]: limit reads fault while other reads succeed
//! - [`MockDevice::reject_writes`]: writes are refused with the given message
//! - [`MockDevice::refuse_subscription`]: push subscription fails at adapter
//!   construction
//!
//! Writes update the stored value and push a `ValueChanged` signal, like a
//! real object reporting its new position.

use async_trait::async_trait;
use beamline_core::{
    Actuator, Beam, BeamInfo, Capability, CommandSpec, DataPublisher, Detector, Diffractometer,
    Energy, HardwareError, HardwareHandle, HardwareObject, HardwareSignal, HardwareState, HwResult,
    MachineInfo, Motor, NState, Shutter,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::repository::HardwareRepository;

const SIGNAL_CAPACITY: usize = 64;

// =============================================================================
// MockDevice
// =============================================================================

/// Configurable in-memory hardware object.
///
/// # Example
///
/// ```rust,ignore
/// let zoom = Arc::new(
///     MockDevice::new("/zoom")
///         .with_values(["1X", "2X", "4X"])
///         .with_value(json!("1X")),
/// );
/// let handle = MockDevice::handle(&zoom, &[Capability::NState]);
/// ```
pub struct MockDevice {
    name: String,
    username: Option<String>,
    read_only: bool,
    values: Vec<String>,
    limits: (Option<f64>, Option<f64>),
    commands: Vec<CommandSpec>,
    attributes: Option<serde_json::Map<String, Value>>,
    status: String,
    value: Mutex<Value>,
    state: Mutex<HardwareState>,
    executed: Mutex<Vec<String>>,
    fail_reads: AtomicBool,
    fail_limits: AtomicBool,
    reject_writes: Mutex<Option<String>>,
    refuse_subscription: bool,
    signals: broadcast::Sender<HardwareSignal>,
}

impl MockDevice {
    /// Ready device with value `0.0` and no limits.
    pub fn new(name: impl Into<String>) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            name: name.into(),
            username: None,
            read_only: false,
            values: Vec::new(),
            limits: (None, None),
            commands: Vec::new(),
            attributes: None,
            status: String::new(),
            value: Mutex::new(json!(0.0)),
            state: Mutex::new(HardwareState::Ready),
            executed: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_limits: AtomicBool::new(false),
            reject_writes: Mutex::new(None),
            refuse_subscription: false,
            signals,
        }
    }

    /// Set the preferred display name.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the initial value.
    pub fn with_value(self, value: Value) -> Self {
        *self.value.lock() = value;
        self
    }

    /// Set the selectable values (n-state values, phases, channels).
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Set the limits.
    pub fn with_limits(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.limits = (min, max);
        self
    }

    /// Export a command.
    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }

    /// Declare an attribute schema.
    pub fn with_attributes(mut self, attributes: serde_json::Map<String, Value>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Set the detector status message.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Flag the object read only.
    pub fn with_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Make the push subscription fail.
    pub fn refuse_subscription(mut self) -> Self {
        self.refuse_subscription = true;
        self
    }

    /// Build a handle declaring `capabilities`.
    pub fn handle(device: &Arc<Self>, capabilities: &[Capability]) -> HardwareHandle {
        let mut handle = HardwareHandle::new(device.clone());
        for capability in capabilities {
            handle = match capability {
                Capability::NState => handle.with_nstate(device.clone()),
                Capability::Shutter => handle.with_shutter(device.clone()),
                Capability::Diffractometer => handle.with_diffractometer(device.clone()),
                Capability::Energy => handle.with_energy(device.clone()),
                Capability::Detector => handle.with_detector(device.clone()),
                Capability::MachineInfo => handle.with_machine_info(device.clone()),
                Capability::Beam => handle.with_beam(device.clone()),
                Capability::DataPublisher => handle.with_data_publisher(device.clone()),
                Capability::Motor => handle.with_motor(device.clone()),
                Capability::Actuator => handle.with_actuator(device.clone()),
            };
        }
        handle
    }

    // Fault injection and inspection

    /// Make every read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make limit reads fail.
    pub fn fail_limits(&self, fail: bool) {
        self.fail_limits.store(fail, Ordering::SeqCst);
    }

    /// Refuse writes with `reason`; `None` accepts them again.
    pub fn reject_writes(&self, reason: Option<&str>) {
        *self.reject_writes.lock() = reason.map(str::to_string);
    }

    /// Current stored value.
    pub fn value(&self) -> Value {
        self.value.lock().clone()
    }

    /// Commands executed so far.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Change state and push a `StateChanged` signal.
    pub fn set_state(&self, state: HardwareState) {
        *self.state.lock() = state;
        let _ = self.signals.send(HardwareSignal::StateChanged(state));
    }

    /// Push a `ValueChanged` signal without a write (hardware moved by itself).
    pub fn push_value(&self, value: Value) {
        *self.value.lock() = value.clone();
        let _ = self.signals.send(HardwareSignal::ValueChanged(value));
    }

    fn check_read(&self) -> HwResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HardwareError::communication(format!(
                "{} is not responding",
                self.name
            )));
        }
        Ok(())
    }

    fn write(&self, value: Value) -> HwResult<()> {
        if let Some(reason) = self.reject_writes.lock().clone() {
            return Err(HardwareError::rejected(reason));
        }
        self.push_value(value);
        Ok(())
    }

    fn read_f64(&self) -> HwResult<f64> {
        self.check_read()?;
        let value = self.value();
        value
            .as_f64()
            .ok_or_else(|| HardwareError::conversion(format!("{} is not a number", value)))
    }

    fn read_string(&self) -> HwResult<String> {
        self.check_read()?;
        match self.value() {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    fn read_limits(&self) -> HwResult<(Option<f64>, Option<f64>)> {
        self.check_read()?;
        if self.fail_limits.load(Ordering::SeqCst) {
            return Err(HardwareError::communication("limit switch query failed"));
        }
        Ok(self.limits)
    }
}

// =============================================================================
// Capability Implementations
// =============================================================================

#[async_trait]
impl HardwareObject for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    async fn state(&self) -> HwResult<HardwareState> {
        self.check_read()?;
        Ok(*self.state.lock())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn exported_commands(&self) -> Vec<CommandSpec> {
        self.commands.clone()
    }

    async fn execute_command(&self, name: &str, _args: &Value) -> HwResult<()> {
        if let Some(reason) = self.reject_writes.lock().clone() {
            return Err(HardwareError::rejected(reason));
        }
        self.executed.lock().push(name.to_string());
        Ok(())
    }

    fn exported_attributes(&self) -> Option<serde_json::Map<String, Value>> {
        self.attributes.clone()
    }

    fn subscribe(&self) -> HwResult<Option<broadcast::Receiver<HardwareSignal>>> {
        if self.refuse_subscription {
            return Err(HardwareError::communication(format!(
                "{} refused signal connection",
                self.name
            )));
        }
        Ok(Some(self.signals.subscribe()))
    }
}

#[async_trait]
impl NState for MockDevice {
    fn values(&self) -> Vec<String> {
        self.values.clone()
    }

    async fn get_value(&self) -> HwResult<String> {
        self.read_string()
    }

    async fn set_value(&self, value: &str) -> HwResult<()> {
        self.write(json!(value))
    }

    async fn stop(&self) -> HwResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Shutter for MockDevice {
    async fn open(&self) -> HwResult<()> {
        self.write(json!("OPEN"))
    }

    async fn close(&self) -> HwResult<()> {
        self.write(json!("CLOSED"))
    }

    async fn is_open(&self) -> HwResult<bool> {
        Ok(self.read_string()? == "OPEN")
    }
}

#[async_trait]
impl Diffractometer for MockDevice {
    fn phases(&self) -> Vec<String> {
        self.values.clone()
    }

    async fn current_phase(&self) -> HwResult<String> {
        self.read_string()
    }

    async fn set_phase(&self, phase: &str) -> HwResult<()> {
        self.write(json!(phase))
    }
}

#[async_trait]
impl Energy for MockDevice {
    async fn get_energy(&self) -> HwResult<f64> {
        self.read_f64()
    }

    async fn set_energy(&self, energy_kev: f64) -> HwResult<()> {
        self.write(json!(energy_kev))
    }

    async fn energy_limits(&self) -> HwResult<(Option<f64>, Option<f64>)> {
        self.read_limits()
    }

    async fn stop(&self) -> HwResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Detector for MockDevice {
    async fn status_message(&self) -> HwResult<String> {
        self.check_read()?;
        Ok(self.status.clone())
    }
}

#[async_trait]
impl MachineInfo for MockDevice {
    async fn machine_values(&self) -> HwResult<BTreeMap<String, Value>> {
        self.check_read()?;
        match self.value() {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Ok(BTreeMap::from([("value".to_string(), other)])),
        }
    }
}

#[async_trait]
impl Beam for MockDevice {
    async fn beam_info(&self) -> HwResult<BeamInfo> {
        self.check_read()?;
        serde_json::from_value(self.value()).map_err(|e| HardwareError::conversion(e.to_string()))
    }
}

impl DataPublisher for MockDevice {
    fn channels(&self) -> Vec<String> {
        self.values.clone()
    }
}

#[async_trait]
impl Motor for MockDevice {
    async fn move_abs(&self, position: f64) -> HwResult<()> {
        self.write(json!(position))
    }

    async fn position(&self) -> HwResult<f64> {
        self.read_f64()
    }

    async fn motor_limits(&self) -> HwResult<(Option<f64>, Option<f64>)> {
        self.read_limits()
    }

    async fn stop(&self) -> HwResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Actuator for MockDevice {
    async fn get_value(&self) -> HwResult<f64> {
        self.read_f64()
    }

    async fn set_value(&self, value: f64) -> HwResult<()> {
        self.write(json!(value))
    }

    async fn get_limits(&self) -> HwResult<(Option<f64>, Option<f64>)> {
        self.read_limits()
    }

    async fn stop(&self) -> HwResult<()> {
        Ok(())
    }
}

// =============================================================================
// Configuration-driven mocks
// =============================================================================

/// Flavour of a configured mock object.
///
/// Each flavour declares the capability set a real object of that type
/// implements (a motor is also an actuator, a shutter is also an n-state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MockKind {
    /// Motor + Actuator
    Motor,
    /// Actuator only
    Actuator,
    /// Shutter + NState
    Shutter,
    /// NState
    NState,
    /// Diffractometer
    Diffractometer,
    /// Energy + Actuator
    Energy,
    /// Detector
    Detector,
    /// MachineInfo
    MachineInfo,
    /// Beam
    Beam,
    /// DataPublisher
    DataPublisher,
    /// No capability (never classified)
    Bare,
}

impl MockKind {
    /// Capabilities declared by this flavour.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Motor => &[Capability::Motor, Capability::Actuator],
            Self::Actuator => &[Capability::Actuator],
            Self::Shutter => &[Capability::Shutter, Capability::NState],
            Self::NState => &[Capability::NState],
            Self::Diffractometer => &[Capability::Diffractometer],
            Self::Energy => &[Capability::Energy, Capability::Actuator],
            Self::Detector => &[Capability::Detector],
            Self::MachineInfo => &[Capability::MachineInfo],
            Self::Beam => &[Capability::Beam],
            Self::DataPublisher => &[Capability::DataPublisher],
            Self::Bare => &[],
        }
    }
}

/// One mock hardware object as written in the configuration file.
///
/// ```toml
/// [[hardware.objects]]
/// name = "/phi"
/// kind = "motor"
/// value = 0.0
/// limits = [-180.0, 180.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockObjectConfig {
    /// Repository name (e.g. `/phi`)
    pub name: String,
    /// Preferred display name
    #[serde(default)]
    pub username: Option<String>,
    /// Object flavour
    pub kind: MockKind,
    /// Initial value
    #[serde(default)]
    pub value: Option<Value>,
    /// `[min, max]` limits
    #[serde(default)]
    pub limits: Option<(f64, f64)>,
    /// Selectable values
    #[serde(default)]
    pub values: Vec<String>,
    /// Exported command names
    #[serde(default)]
    pub commands: Vec<String>,
    /// Detector status text
    #[serde(default)]
    pub status: Option<String>,
    /// Read-only flag
    #[serde(default)]
    pub read_only: bool,
}

impl MockObjectConfig {
    /// Instantiate the configured object.
    pub fn build(&self) -> HardwareHandle {
        let mut device = MockDevice::new(self.name.clone()).with_values(self.values.clone());
        if let Some(username) = &self.username {
            device = device.with_username(username.clone());
        }
        if let Some(value) = &self.value {
            device = device.with_value(value.clone());
        }
        if let Some((min, max)) = self.limits {
            device = device.with_limits(Some(min), Some(max));
        }
        if let Some(status) = &self.status {
            device = device.with_status(status.clone());
        }
        for command in &self.commands {
            device = device.with_command(CommandSpec::new(command.clone()));
        }
        if self.read_only {
            device = device.with_read_only();
        }
        MockDevice::handle(&Arc::new(device), self.kind.capabilities())
    }
}

// =============================================================================
// MockRepository
// =============================================================================

/// Hardware repository serving a fixed list of handles.
#[derive(Default)]
pub struct MockRepository {
    handles: Vec<HardwareHandle>,
    failure: Option<String>,
}

impl MockRepository {
    /// Repository serving `handles`.
    pub fn new(handles: Vec<HardwareHandle>) -> Self {
        Self {
            handles,
            failure: None,
        }
    }

    /// Repository built from configured objects.
    pub fn from_config(objects: &[MockObjectConfig]) -> Self {
        Self::new(objects.iter().map(MockObjectConfig::build).collect())
    }

    /// Repository whose enumeration fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            handles: Vec::new(),
            failure: Some(reason.into()),
        }
    }
}

#[async_trait]
impl HardwareRepository for MockRepository {
    async fn enumerate(&self) -> anyhow::Result<Vec<HardwareHandle>> {
        if let Some(reason) = &self.failure {
            anyhow::bail!("{}", reason);
        }
        Ok(self.handles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_push_value_signals() {
        let device = Arc::new(MockDevice::new("/phi"));
        let mut rx = device.subscribe().unwrap().unwrap();

        Motor::move_abs(device.as_ref(), 4.0).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            HardwareSignal::ValueChanged(json!(4.0))
        );
    }

    #[tokio::test]
    async fn rejected_writes_keep_value() {
        let device = MockDevice::new("/phi").with_value(json!(1.0));
        device.reject_writes(Some("interlock active"));

        let err = Motor::move_abs(&device, 4.0).await.unwrap_err();
        assert_eq!(err.to_string(), "interlock active");
        assert_eq!(device.value(), json!(1.0));
    }

    #[test]
    fn configured_kinds_declare_real_capability_sets() {
        let config: MockObjectConfig = toml::from_str(
            r#"
            name = "/safshut"
            kind = "shutter"
            value = "CLOSED"
            "#,
        )
        .unwrap();
        let handle = config.build();
        assert_eq!(
            handle.capabilities(),
            vec![Capability::NState, Capability::Shutter]
        );
    }

    #[tokio::test]
    async fn failing_repository() {
        let repo = MockRepository::failing("repository offline");
        let err = repo.enumerate().await.unwrap_err();
        assert_eq!(err.to_string(), "repository offline");
    }
}
