//! End-to-end behaviour of the adapter layer: bootstrap from a repository,
//! classification, registry uniqueness, fault handling and push relay.

use std::sync::Arc;
use std::time::Duration;

use beamline_core::{AdapterState, Capability, ChangeBroadcaster, Channel, CommandSpec};
use beamline_hardware::drivers::mock::{MockDevice, MockRepository};
use beamline_hardware::{bootstrap, AdapterKind, AdapterRegistry, StartupError};
use serde_json::json;
use tokio::time::timeout;

struct Beamline {
    registry: AdapterRegistry,
    broadcaster: ChangeBroadcaster,
    phi: Arc<MockDevice>,
    energy: Arc<MockDevice>,
    shutter: Arc<MockDevice>,
}

async fn beamline() -> Beamline {
    let phi = Arc::new(
        MockDevice::new("/phi")
            .with_value(json!(10.0))
            .with_limits(Some(-180.0), Some(180.0))
            .with_command(CommandSpec::new("home")),
    );
    let energy = Arc::new(MockDevice::new("/energy").with_value(json!(12.4)));
    let shutter = Arc::new(
        MockDevice::new("/safshut")
            .with_username("Safety Shutter")
            .with_value(json!("CLOSED")),
    );
    let orphan = Arc::new(MockDevice::new("/session"));
    let twin = Arc::new(MockDevice::new("/PHI"));

    let repository = MockRepository::new(vec![
        MockDevice::handle(&phi, &[Capability::Motor, Capability::Actuator]),
        MockDevice::handle(&orphan, &[]),
        MockDevice::handle(&energy, &[Capability::Energy, Capability::Actuator]),
        MockDevice::handle(&shutter, &[Capability::Shutter, Capability::Actuator]),
        MockDevice::handle(&twin, &[Capability::Motor]),
    ]);

    let registry = AdapterRegistry::new();
    let broadcaster = ChangeBroadcaster::new();
    let report = bootstrap(&repository, &registry, &broadcaster).await.unwrap();

    assert_eq!(report.registered, vec!["phi", "energy", "safety_shutter"]);
    assert_eq!(report.duplicates, vec!["phi"]);
    assert_eq!(report.unclassified, vec!["/session"]);
    assert_eq!(report.enumerated(), 5);

    Beamline {
        registry,
        broadcaster,
        phi,
        energy,
        shutter,
    }
}

#[tokio::test]
async fn unmatched_object_does_not_stop_later_ones() {
    let bl = beamline().await;
    assert_eq!(bl.registry.len(), 3);
    assert!(bl.registry.lookup("session").is_none());
    assert!(bl.registry.lookup("energy").is_some());
}

#[tokio::test]
async fn duplicate_id_keeps_first_object() {
    let bl = beamline().await;
    let phi = bl.registry.lookup("phi").unwrap();
    assert_eq!(phi.handle().name(), "/phi");
}

#[tokio::test]
async fn shutter_with_actuator_is_nstate() {
    let bl = beamline().await;
    let shutter = bl.registry.lookup("safety_shutter").unwrap();
    assert_eq!(shutter.kind(), AdapterKind::NState);

    let snapshot = shutter.set_value(json!("OPEN")).await;
    assert_eq!(snapshot.state, AdapterState::Ready);
    assert_eq!(snapshot.value_type, "NSTATE");
    assert_eq!(snapshot.value.unwrap().value, json!("OPEN"));
    assert_eq!(bl.shutter.value(), json!("OPEN"));
}

#[tokio::test]
async fn absent_limits_are_zero_sentinel() {
    let bl = beamline().await;
    let energy = bl.registry.lookup("energy").unwrap();
    assert_eq!(energy.limits().await.unwrap(), (0.0, 0.0));

    bl.energy.fail_limits(true);
    let err = energy.limits().await.unwrap_err();
    assert_eq!(err.to_string(), "limit switch query failed");
}

#[tokio::test]
async fn invalid_writes_are_unusable_snapshots() {
    let bl = beamline().await;
    let phi = bl.registry.lookup("phi").unwrap();

    for bad in [json!("north"), json!(1e6), json!(null)] {
        let snapshot = phi.set_value(bad).await;
        assert_eq!(snapshot.state, AdapterState::Unusable);
        assert!(!snapshot.msg.is_empty());
    }

    bl.phi.reject_writes(Some("Motor interlocked"));
    let snapshot = phi.set_value(json!(5.0)).await;
    assert_eq!(snapshot.state, AdapterState::Unusable);
    assert_eq!(snapshot.msg, "Motor interlocked");
    assert_eq!(bl.phi.value(), json!(10.0));
}

#[tokio::test]
async fn read_fault_degrades_snapshot() {
    let bl = beamline().await;
    let phi = bl.registry.lookup("phi").unwrap();

    bl.phi.fail_reads(true);
    let snapshot = phi.to_snapshot().await;
    assert_eq!(snapshot.state, AdapterState::Unknown);
    assert_eq!(snapshot.value_type, "FLOAT");
    assert!(!snapshot.available);
    assert!(snapshot.msg.starts_with("Exception: "));
}

#[tokio::test]
async fn commands_are_forwarded() {
    let bl = beamline().await;
    let phi = bl.registry.lookup("phi").unwrap();

    let snapshot = phi.execute_command("home", json!({})).await;
    assert_eq!(snapshot.state, AdapterState::Ready);
    assert_eq!(bl.phi.executed(), vec!["home"]);

    let unknown = phi.execute_command("self_destruct", json!({})).await;
    assert!(unknown.is_unusable());
}

#[tokio::test]
async fn value_push_is_relayed_with_adapter_id() {
    let bl = beamline().await;
    let mut rx = bl.broadcaster.subscribe();

    bl.phi.push_value(json!(33.0));

    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.channel, Channel::BeamlineValueChange);
    assert_eq!(event.payload, json!({"name": "phi", "value": 33.0}));
}

#[tokio::test]
async fn dropped_duplicate_does_not_relay() {
    let twin = Arc::new(MockDevice::new("/phi"));
    let first = Arc::new(MockDevice::new("/phi"));
    let repository = MockRepository::new(vec![
        MockDevice::handle(&first, &[Capability::Motor]),
        MockDevice::handle(&twin, &[Capability::Motor]),
    ]);
    let registry = AdapterRegistry::new();
    let broadcaster = ChangeBroadcaster::new();
    bootstrap(&repository, &registry, &broadcaster).await.unwrap();

    let mut rx = broadcaster.subscribe();
    twin.push_value(json!(1.0));
    first.push_value(json!(2.0));

    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.payload["value"], json!(2.0));
}

#[tokio::test]
async fn failing_enumeration_is_a_startup_error() {
    let repository = MockRepository::failing("hardware repository not reachable");
    let err = bootstrap(&repository, &AdapterRegistry::new(), &ChangeBroadcaster::new())
        .await
        .unwrap_err();

    assert!(matches!(err, StartupError::Enumeration(_)));
    assert!(err.to_string().contains("hardware repository not reachable"));
}
