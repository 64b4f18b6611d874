//! End-to-end wiring: configuration → bootstrap → control-gated writes.

use beamline_control::{Account, LoginRequest};
use beamline_core::{AdapterState, Channel};
use beamline_hardware::drivers::mock::{MockKind, MockObjectConfig, MockRepository};
use beamline_hardware::StartupError;
use beamline_server::{App, RequestError, ServiceConfig};
use serde_json::json;

fn object(name: &str, kind: MockKind) -> MockObjectConfig {
    MockObjectConfig {
        name: name.to_string(),
        username: None,
        kind,
        value: None,
        limits: None,
        values: Vec::new(),
        commands: Vec::new(),
        status: None,
        read_only: false,
    }
}

fn config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.hardware.objects = vec![
        MockObjectConfig {
            value: Some(json!(0.0)),
            limits: Some((-180.0, 180.0)),
            commands: vec!["home".to_string()],
            ..object("/phi", MockKind::Motor)
        },
        MockObjectConfig {
            username: Some("Machine Info".to_string()),
            ..object("/mach", MockKind::MachineInfo)
        },
        object("/session", MockKind::Bare),
    ];
    config.accounts = vec![Account::new("mx1234", "demo")];
    config
}

#[tokio::test]
async fn bootstrap_from_configuration() {
    let app = App::build(config()).await.unwrap();

    assert_eq!(app.report().registered, vec!["phi", "machine_info"]);
    assert_eq!(app.report().unclassified, vec!["/session"]);
    assert_eq!(app.registry().len(), 2);

    let table = app.adapter_table();
    assert!(table.contains("phi"));
    assert!(table.contains("machine_info"));
    assert!(!table.contains("/session"));
}

#[tokio::test]
async fn only_the_operator_writes() {
    let app = App::build(config()).await.unwrap();
    let control = app.control();

    let operator = control
        .login(LoginRequest::local("mx1234", "demo").with_session("s1"))
        .await
        .unwrap();
    let observer = control
        .login(LoginRequest::local("mx1234", "demo").with_session("s2"))
        .await
        .unwrap();

    let mut rx = app.broadcaster().subscribe();
    let snapshot = app
        .set_attribute(&operator.username, "phi", json!(42.5))
        .await
        .unwrap();
    assert!(!snapshot.is_unusable());
    assert_eq!(snapshot.value.unwrap().value, json!(42.5));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.channel, Channel::BeamlineValueChange);
    assert_eq!(event.payload, json!({"name": "phi", "value": 42.5}));

    let err = app
        .set_attribute(&observer.username, "phi", json!(1.0))
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::NotInControl(observer.username.clone()));

    let err = app
        .set_attribute(&operator.username, "omega", json!(1.0))
        .await
        .unwrap_err();
    assert_eq!(err, RequestError::UnknownAdapter("omega".into()));
}

#[tokio::test]
async fn hardware_faults_come_back_as_snapshots() {
    let app = App::build(config()).await.unwrap();
    let operator = app
        .control()
        .login(LoginRequest::local("mx1234", "demo").with_session("s1"))
        .await
        .unwrap();

    let out_of_range = app
        .set_attribute(&operator.username, "phi", json!(720.0))
        .await
        .unwrap();
    assert_eq!(out_of_range.state, AdapterState::Unusable);
    assert!(!out_of_range.msg.is_empty());

    let read_only = app
        .set_attribute(&operator.username, "machine_info", json!(1.0))
        .await
        .unwrap();
    assert!(read_only.is_unusable());

    let homed = app
        .execute_command(&operator.username, "phi", "home", json!([]))
        .await
        .unwrap();
    assert!(!homed.is_unusable());

    let snapshot = app.get_attribute("phi").await.unwrap();
    assert_eq!(snapshot.name, "phi");
    assert_eq!(snapshot.value.unwrap().limits, (-180.0, 180.0));
}

#[tokio::test]
async fn enumeration_failure_is_fatal() {
    let repository = MockRepository::failing("tango database unreachable");
    let err = App::with_repository(config(), &repository)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, StartupError::Enumeration(_)));
    assert!(err.to_string().contains("tango database unreachable"));
}
