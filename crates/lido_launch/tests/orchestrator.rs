//! Orchestrator tests: staged startup, fan-out barrier and teardown

#![cfg(unix)]

mod common;

use common::*;
use lido_launch::runtime::FailurePolicy;
use lido_launch::{
    DiscoveryError, OrchestratorError, ProcessError, ServiceState, ShutdownCoordinator,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};

const PIPELINE: &str = r#"
services:
  chain:
    command: ["/bin/sh", "-c", "echo 'Started HTTP and WebSocket JSON-RPC server at http://127.0.0.1:8545/'; sleep 30"]
    poll_interval_ms: 50
    timeout_polls: 100
    readiness:
      success: 'JSON-RPC server at'
      captures:
        url: 'JSON-RPC server at (\S+)'
  deploy:
    kind: task
    command: ["/bin/sh", "-c", "echo deploying to $(arg chain_url)"]
    depends_on: [chain]
    poll_interval_ms: 50
    timeout_polls: 100
"#;

fn names(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_stages_run_in_order_with_exported_endpoint() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(dir.path(), PIPELINE, |_| {});
    let coordinator = ShutdownCoordinator::new();

    orchestrator.run(&coordinator).await.unwrap();

    assert_eq!(
        orchestrator.status(),
        vec![("chain", ServiceState::Running), ("deploy", ServiceState::Completed)]
    );
    let deploy = orchestrator.service("deploy").unwrap();
    assert!(deploy
        .output()
        .stdout()
        .contains("deploying to http://127.0.0.1:8545/"));

    assert_eq!(
        coordinator.stop_all(orchestrator.services_mut()),
        vec!["deploy", "chain"]
    );
    assert!(orchestrator.services_mut().all(|s| !s.is_alive()));
}

#[tokio::test]
async fn test_teardown_runs_in_reverse_start_order() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
services:
  ipfs:
    command: ["/bin/sh", "-c", "echo 'Daemon is ready'; sleep 30"]
    poll_interval_ms: 50
    readiness:
      success: 'Daemon is ready'
  node:
    command: ["/bin/sh", "-c", "echo 'JSON-RPC server at http://127.0.0.1:8545/'; sleep 30"]
    poll_interval_ms: 50
    readiness:
      success: 'JSON-RPC server at'
  aragon:
    command: ["/bin/sh", "-c", "echo 'Built in 2s'; sleep 30"]
    depends_on: [ipfs, node]
    poll_interval_ms: 50
    readiness:
      success: 'Built in'
"#;
    let mut orchestrator = orchestrator(dir.path(), yaml, |_| {});
    let coordinator = ShutdownCoordinator::new();

    orchestrator.run(&coordinator).await.unwrap();
    let services = orchestrator.services_mut();
    let pids: Vec<_> = services.filter_map(|s| s.pid()).collect();
    assert_eq!(pids.len(), 3);

    let stopped = coordinator.stop_all(orchestrator.services_mut());

    assert_eq!(stopped, vec!["aragon", "node", "ipfs"]);
    assert!(orchestrator
        .status()
        .iter()
        .all(|(_, state)| *state == ServiceState::Stopped));
    assert!(orchestrator.services_mut().all(|s| !s.is_alive()));
}

#[tokio::test]
async fn test_isolation_skips_unselected_dependencies() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let yaml = PIPELINE.replace("$(arg chain_url)", "nowhere");
    let mut orchestrator = orchestrator(dir.path(), &yaml, |config| {
        config.only = Some(names(&["deploy"]));
    });

    orchestrator.run(&ShutdownCoordinator::new()).await.unwrap();

    assert_eq!(
        orchestrator.status(),
        vec![("deploy", ServiceState::Completed)]
    );
    assert!(orchestrator.service("chain").is_none());
}

#[tokio::test]
async fn test_stage_failure_aborts_pipeline() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
services:
  chain:
    command: ["/bin/sh", "-c", "echo 'listening'; sleep 30"]
    poll_interval_ms: 50
    readiness:
      success: 'listening'
  contracts:
    kind: task
    command: ["/bin/sh", "-c", "echo 'Error HH700: missing artifact' >&2; exit 1"]
    depends_on: [chain]
    poll_interval_ms: 50
  deploy:
    kind: task
    command: ["/bin/sh", "-c", "echo never"]
    depends_on: [contracts]
"#;
    let mut orchestrator = orchestrator(dir.path(), yaml, |_| {});

    let coordinator = ShutdownCoordinator::new();
    let err = orchestrator.run(&coordinator).await.unwrap_err();

    match err {
        OrchestratorError::Service(ProcessError::Exited { name, message, .. }) => {
            assert_eq!(name, "contracts");
            assert_eq!(message, "Error HH700: missing artifact");
        }
        other => panic!("expected task failure, got {:?}", other),
    }
    assert!(orchestrator.service("deploy").is_none());
    // Already-started stages were stopped
    assert_eq!(
        orchestrator.service("chain").unwrap().state(),
        ServiceState::Stopped
    );
}

#[tokio::test]
async fn test_keep_running_on_failure() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
services:
  chain:
    command: ["/bin/sh", "-c", "echo 'listening'; sleep 30"]
    poll_interval_ms: 50
    readiness:
      success: 'listening'
  deploy:
    kind: task
    command: ["/bin/sh", "-c", "exit 1"]
    depends_on: [chain]
    poll_interval_ms: 50
"#;
    let mut orchestrator = orchestrator(dir.path(), yaml, |config| {
        config.failure = FailurePolicy {
            stop_started: false,
            cancel_peers: true,
        };
    });
    let coordinator = ShutdownCoordinator::new();

    assert!(orchestrator.run(&coordinator).await.is_err());
    assert!(orchestrator.service("chain").unwrap().is_alive());

    coordinator.stop_all(orchestrator.services_mut());
    assert!(!orchestrator.service("chain").unwrap().is_alive());
}

const APPS: &str = r#"
services:
  apps:
    kind: apps
    command: ["/bin/sh", "$(arg app_dir)/serve.sh"]
    poll_interval_ms: 50
    timeout_polls: 100
    readiness:
      success: 'Built in'
      captures:
        url: 'Server running at (\S+)'
      error: 'Error:'
"#;

/// Write an app whose `serve.sh` runs `script`
fn write_served_app(root: &std::path::Path, dir: &str, script: &str) {
    write_app(root, dir, dir);
    let serve = root.join("apps").join(dir).join("serve.sh");
    std::fs::write(serve, format!("{}\n", script)).unwrap();
}

#[tokio::test]
async fn test_fan_out_waits_for_all_peers() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    for (app, delay, port) in [
        ("lido", "0", 3010),
        ("oracle", "0.4", 3011),
        ("nos", "0.2", 3012),
    ] {
        let script = format!(
            "sleep {delay}; echo 'Server running at http://localhost:{port} '; \
             echo 'Built in 1s'; sleep 30"
        );
        write_served_app(dir.path(), app, &script);
    }
    let mut orchestrator = orchestrator(dir.path(), APPS, |_| {});
    let coordinator = ShutdownCoordinator::new();

    orchestrator.run(&coordinator).await.unwrap();

    // Tracked in discovery order, all ready once the barrier opens
    let status = orchestrator.status();
    assert_eq!(
        status,
        vec![
            ("apps:lido", ServiceState::Running),
            ("apps:nos", ServiceState::Running),
            ("apps:oracle", ServiceState::Running),
        ]
    );
    let oracle = orchestrator.service("apps:oracle").unwrap();
    assert_eq!(
        oracle.endpoint().and_then(|e| e.url()),
        Some("http://localhost:3011")
    );
    assert_eq!(
        orchestrator.arg("apps_nos_url"),
        Some("http://localhost:3012")
    );

    coordinator.stop_all(orchestrator.services_mut());
}

#[tokio::test]
async fn test_fan_out_failure_cancels_peers() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write_served_app(
        dir.path(),
        "lido",
        "echo 'Error: Cannot find module parcel' >&2; sleep 30",
    );
    // Never becomes ready on its own
    write_served_app(dir.path(), "oracle", "echo 'bundling'; sleep 30");
    let mut orchestrator = orchestrator(dir.path(), APPS, |_| {});

    let started = Instant::now();
    let coordinator = ShutdownCoordinator::new();
    let err = orchestrator.run(&coordinator).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    match err {
        OrchestratorError::Service(ProcessError::PatternFailure { name, message }) => {
            assert_eq!(name, "apps:lido");
            assert_eq!(message, "Error: Cannot find module parcel");
        }
        other => panic!("expected pattern failure, got {:?}", other),
    }
    assert!(orchestrator.services_mut().all(|s| !s.is_alive()));
}

#[tokio::test]
async fn test_fan_out_keeps_peers_when_asked() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write_served_app(
        dir.path(),
        "lido",
        "echo 'Error: Cannot find module parcel' >&2; sleep 30",
    );
    write_served_app(
        dir.path(),
        "oracle",
        "sleep 0.3; echo 'Server running at http://localhost:3011 '; echo 'Built in 1s'; sleep 30",
    );
    let mut orchestrator = orchestrator(dir.path(), APPS, |config| {
        config.failure = FailurePolicy {
            stop_started: false,
            cancel_peers: false,
        };
    });
    let coordinator = ShutdownCoordinator::new();

    assert!(orchestrator.run(&coordinator).await.is_err());
    assert_eq!(
        orchestrator.service("apps:oracle").unwrap().state(),
        ServiceState::Running
    );
    assert_eq!(
        orchestrator.service("apps:lido").unwrap().state(),
        ServiceState::Failed
    );

    coordinator.stop_all(orchestrator.services_mut());
}

#[tokio::test]
async fn test_duplicate_app_names_fail_the_run() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let ready = "echo 'Server running at http://localhost:3010 '; echo 'Built in 1s'; sleep 30";
    write_served_app(dir.path(), "lido", ready);
    write_served_app(dir.path(), "lido-copy", ready);
    write_app(dir.path(), "lido-copy", "lido");
    let mut orchestrator = orchestrator(dir.path(), APPS, |_| {});

    let coordinator = ShutdownCoordinator::new();
    let err = orchestrator.run(&coordinator).await.unwrap_err();

    match err {
        OrchestratorError::Discovery(DiscoveryError::DuplicateName { name, .. }) => {
            assert_eq!(name, "lido");
        }
        other => panic!("expected duplicate app error, got {:?}", other),
    }
    assert!(orchestrator.status().is_empty());
}

#[tokio::test]
async fn test_broken_manifest_fails_before_any_stage() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("apps").join("broken");
    std::fs::create_dir_all(&broken).unwrap();
    std::fs::write(broken.join("manifest.json"), "{ not json").unwrap();
    let marker = dir.path().join("deployed");
    let yaml = format!(
        r#"
services:
  deploy:
    kind: task
    command: ["/bin/sh", "-c", "touch {}"]
    poll_interval_ms: 50
  apps:
    kind: apps
    command: ["/bin/sh", "$(arg app_dir)/serve.sh"]
    depends_on: [deploy]
    poll_interval_ms: 50
    readiness:
      success: 'Built in'
"#,
        marker.display()
    );
    let mut orchestrator = orchestrator(dir.path(), &yaml, |_| {});

    let coordinator = ShutdownCoordinator::new();
    let err = orchestrator.run(&coordinator).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Discovery(DiscoveryError::Manifest { .. })
    ));
    assert!(orchestrator.status().is_empty());
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_no_apps_is_not_an_error() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("apps")).unwrap();
    let mut orchestrator = orchestrator(dir.path(), APPS, |_| {});

    orchestrator.run(&ShutdownCoordinator::new()).await.unwrap();
    assert!(orchestrator.status().is_empty());
}

#[tokio::test]
async fn test_locator_reaches_client_environment() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    write_descriptor(dir.path(), "localhost");
    let yaml = r#"
services:
  aragon:
    command: ["/bin/sh", "-c", "echo \"locator=$ARAGON_APP_LOCATOR\"; echo 'Server running at http://localhost:3000 '; echo 'Built in 2s'; sleep 30"]
    locator_env: ARAGON_APP_LOCATOR
    poll_interval_ms: 50
    readiness:
      success: 'Built in'
      captures:
        url: 'Server running at (\S+)'
      optional_captures:
        locator: 'locator=(\S+)'
"#;
    let mut orchestrator = orchestrator(dir.path(), yaml, |config| {
        config.app_mapping = Some("Lido:http://localhost:3010,Voting:http://localhost:3020".into());
    });
    let coordinator = ShutdownCoordinator::new();

    orchestrator.run(&coordinator).await.unwrap();

    let aragon = orchestrator.service("aragon").unwrap();
    let endpoint = aragon.endpoint().unwrap().clone();
    assert_eq!(endpoint.get("locator"), Some("0xAA:http://localhost:3010/"));

    let summary = orchestrator.summary();
    assert_eq!(summary.dao_address.as_deref(), Some("0xDA0"));
    assert_eq!(
        summary.client_url.as_deref(),
        Some("http://localhost:3000/#/0xDA0")
    );

    coordinator.stop_all(orchestrator.services_mut());
}

#[tokio::test]
async fn test_shutdown_interrupts_launch() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(dir.path(), PIPELINE, |_| {});
    let coordinator = ShutdownCoordinator::new();
    coordinator.trigger();

    let err = orchestrator.run(&coordinator).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Interrupted));
    assert!(orchestrator.status().is_empty());
}

#[tokio::test]
async fn test_shutdown_during_startup_stops_service() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let yaml = r#"
services:
  ipfs:
    command: ["/bin/sh", "-c", "echo 'Initializing daemon...'; sleep 30"]
    poll_interval_ms: 50
    timeout_polls: 1000
    readiness:
      success: 'Daemon is ready'
"#;
    let mut orchestrator = orchestrator(dir.path(), yaml, |_| {});
    let coordinator = std::sync::Arc::new(ShutdownCoordinator::new());

    let trigger = coordinator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.trigger();
    });

    let err = orchestrator.run(&coordinator).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Interrupted));
    assert_eq!(
        orchestrator.service("ipfs").unwrap().state(),
        ServiceState::Stopped
    );
    assert!(!orchestrator.service("ipfs").unwrap().is_alive());
}
