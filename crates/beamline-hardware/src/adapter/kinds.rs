//! Per-kind access to the capability behind an adapter.
//!
//! Each function dispatches on the [`AdapterKind`] chosen at classification
//! and reaches for the matching capability in the handle. A kind whose
//! capability is missing from the handle (only possible for hand-built
//! adapters) reports `NotSupported` rather than panicking.

use crate::classifier::AdapterKind;
use beamline_core::{
    Actuator, Beam, DataPublisher, Detector, Diffractometer, Energy, HardwareError, HardwareHandle,
    HwResult, MachineInfo, Motor, NState, Shutter,
};
use serde_json::{json, Value};
use std::sync::Arc;

const SHUTTER_OPEN: &str = "OPEN";
const SHUTTER_CLOSED: &str = "CLOSED";

fn require<'a, T: ?Sized>(capability: &'a Option<Arc<T>>, what: &str) -> HwResult<&'a Arc<T>> {
    capability
        .as_ref()
        .ok_or_else(|| HardwareError::not_supported(what))
}

/// Convert a client-supplied value to a number.
///
/// Clients send numbers either as JSON numbers or as strings.
pub(crate) fn to_float(value: &Value) -> HwResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(HardwareError::conversion(format!(
            "Could not convert {} to a number",
            value
        ))),
    }
}

fn to_choice(value: &Value, choices: &[String]) -> HwResult<String> {
    let choice = match value {
        Value::String(s) => s.clone(),
        other => {
            return Err(HardwareError::conversion(format!(
                "Expected a string, got {}",
                other
            )))
        }
    };
    if choices.iter().any(|c| c == &choice) {
        Ok(choice)
    } else {
        Err(HardwareError::conversion(format!(
            "Invalid value {}, expected one of [{}]",
            choice,
            choices.join(", ")
        )))
    }
}

fn check_range(value: f64, limits: (Option<f64>, Option<f64>)) -> HwResult<()> {
    let (min, max) = limits;
    if min.is_some_and(|m| value < m) || max.is_some_and(|m| value > m) {
        return Err(HardwareError::out_of_range(
            value,
            min.unwrap_or(f64::NEG_INFINITY),
            max.unwrap_or(f64::INFINITY),
        ));
    }
    Ok(())
}

/// Read the primary value.
pub(crate) async fn read_value(kind: AdapterKind, handle: &HardwareHandle) -> HwResult<Value> {
    match kind {
        AdapterKind::NState => {
            if let Some(nstate) = &handle.nstate {
                Ok(json!(nstate.get_value().await?))
            } else {
                let shutter = require(&handle.shutter, "n-state value")?;
                let open = shutter.is_open().await?;
                Ok(json!(if open { SHUTTER_OPEN } else { SHUTTER_CLOSED }))
            }
        }
        AdapterKind::Diffractometer => {
            let diff = require(&handle.diffractometer, "phase")?;
            Ok(json!(diff.current_phase().await?))
        }
        AdapterKind::Energy => {
            let energy = require(&handle.energy, "energy")?;
            Ok(json!(energy.get_energy().await?))
        }
        AdapterKind::MachineInfo => {
            let info = require(&handle.machine_info, "machine info")?;
            Ok(Value::Object(info.machine_values().await?.into_iter().collect()))
        }
        AdapterKind::Beam => {
            let beam = require(&handle.beam, "beam info")?;
            serde_json::to_value(beam.beam_info().await?)
                .map_err(|e| HardwareError::conversion(e.to_string()))
        }
        AdapterKind::Motor => {
            let motor = require(&handle.motor, "position")?;
            Ok(json!(motor.position().await?))
        }
        AdapterKind::Actuator => {
            let actuator = require(&handle.actuator, "value")?;
            Ok(json!(actuator.get_value().await?))
        }
        AdapterKind::Detector | AdapterKind::DataPublisher => {
            Err(HardwareError::not_supported("get_value"))
        }
    }
}

/// Convert and write a new primary value.
pub(crate) async fn write_value(
    kind: AdapterKind,
    handle: &HardwareHandle,
    value: &Value,
) -> HwResult<()> {
    match kind {
        AdapterKind::NState => {
            if let Some(nstate) = &handle.nstate {
                let choice = to_choice(value, &nstate.values())?;
                nstate.set_value(&choice).await
            } else {
                let shutter = require(&handle.shutter, "n-state value")?;
                let choices = [SHUTTER_OPEN.to_string(), SHUTTER_CLOSED.to_string()];
                if to_choice(value, &choices)? == SHUTTER_OPEN {
                    shutter.open().await
                } else {
                    shutter.close().await
                }
            }
        }
        AdapterKind::Diffractometer => {
            let diff = require(&handle.diffractometer, "phase")?;
            let phase = to_choice(value, &diff.phases())?;
            diff.set_phase(&phase).await
        }
        AdapterKind::Energy => {
            let energy = require(&handle.energy, "energy")?;
            let target = to_float(value)?;
            check_range(target, energy.energy_limits().await?)?;
            energy.set_energy(target).await
        }
        AdapterKind::Motor => {
            let motor = require(&handle.motor, "position")?;
            let target = to_float(value)?;
            check_range(target, motor.motor_limits().await?)?;
            motor.move_abs(target).await
        }
        AdapterKind::Actuator => {
            let actuator = require(&handle.actuator, "value")?;
            let target = to_float(value)?;
            check_range(target, actuator.get_limits().await?)?;
            actuator.set_value(target).await
        }
        AdapterKind::MachineInfo | AdapterKind::Beam => {
            Err(HardwareError::read_only(handle.name()))
        }
        AdapterKind::Detector | AdapterKind::DataPublisher => {
            Err(HardwareError::not_supported("set_value"))
        }
    }
}

/// Raw limits; `None` bounds are not configured.
pub(crate) async fn read_limits(
    kind: AdapterKind,
    handle: &HardwareHandle,
) -> HwResult<(Option<f64>, Option<f64>)> {
    match kind {
        AdapterKind::Energy => require(&handle.energy, "limits")?.energy_limits().await,
        AdapterKind::Motor => require(&handle.motor, "limits")?.motor_limits().await,
        AdapterKind::Actuator => require(&handle.actuator, "limits")?.get_limits().await,
        _ => Ok((None, None)),
    }
}

/// Interrupt the action in progress.
pub(crate) async fn stop(kind: AdapterKind, handle: &HardwareHandle) -> HwResult<()> {
    match kind {
        AdapterKind::NState => require(&handle.nstate, "stop")?.stop().await,
        AdapterKind::Energy => require(&handle.energy, "stop")?.stop().await,
        AdapterKind::Motor => require(&handle.motor, "stop")?.stop().await,
        AdapterKind::Actuator => require(&handle.actuator, "stop")?.stop().await,
        _ => Err(HardwareError::not_supported("stop")),
    }
}

/// State message shown next to the value.
pub(crate) async fn read_msg(kind: AdapterKind, handle: &HardwareHandle) -> HwResult<String> {
    match kind {
        AdapterKind::Detector => require(&handle.detector, "status")?.status_message().await,
        AdapterKind::DataPublisher => {
            let publisher = require(&handle.data_publisher, "channels")?;
            Ok(publisher.channels().join(", "))
        }
        _ => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_conversion_accepts_numeric_strings() {
        assert_eq!(to_float(&json!(2.5)).unwrap(), 2.5);
        assert_eq!(to_float(&json!(" 7 ")).unwrap(), 7.0);
        let err = to_float(&json!("abc")).unwrap_err();
        assert_eq!(err.kind, beamline_core::HardwareErrorKind::Conversion);
        assert!(to_float(&json!(null)).is_err());
    }

    #[test]
    fn choice_must_be_listed() {
        let choices = vec!["IN".to_string(), "OUT".to_string()];
        assert_eq!(to_choice(&json!("IN"), &choices).unwrap(), "IN");
        let err = to_choice(&json!("HALF"), &choices).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value HALF, expected one of [IN, OUT]");
    }

    #[test]
    fn each_bound_is_checked_on_its_own() {
        assert!(check_range(50.0, (Some(0.0), Some(10.0))).is_err());
        assert!(check_range(5.0, (Some(0.0), Some(10.0))).is_ok());

        let err = check_range(-5.0, (Some(0.0), None)).unwrap_err();
        assert_eq!(err.kind, beamline_core::HardwareErrorKind::OutOfRange);
        assert_eq!(err.to_string(), "Value -5 outside limits (0, inf)");
        assert!(check_range(50.0, (Some(0.0), None)).is_ok());

        assert!(check_range(11.0, (None, Some(10.0))).is_err());
        assert!(check_range(-1e9, (None, Some(10.0))).is_ok());
        assert!(check_range(1e9, (None, None)).is_ok());
    }
}
