//! Supervisor tests against real `/bin/sh` children

#![cfg(unix)]

mod common;

use common::*;
use lido_launch::runtime::Lifecycle;
use lido_launch::{ProcessConfig, ProcessError, ReadinessMatcher, Service, ServiceState};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_ready_with_endpoint() {
    init_logging();
    let mut service = daemon(
        "apps:lido",
        "echo 'yarn run v1.22'; sleep 0.2; \
         echo 'Server running at http://localhost:3010 '; echo 'Built in 812ms'; sleep 30",
    );

    service.start().await.unwrap();

    assert_eq!(service.state(), ServiceState::Running);
    assert!(service.is_alive());
    assert_eq!(
        service.endpoint().and_then(|e| e.url()),
        Some("http://localhost:3010")
    );

    service.stop();
    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(!service.is_alive());
    assert!(service.endpoint().is_none());
    assert!(service.output().is_empty());
}

#[tokio::test]
async fn test_error_before_success() {
    init_logging();
    let mut service = daemon(
        "aragon",
        "echo 'starting'; \
         echo 'Error: listen EADDRINUSE: address already in use :::3000' >&2; sleep 30",
    );

    let err = service.start().await.unwrap_err();
    match err {
        ProcessError::PatternFailure { name, message } => {
            assert_eq!(name, "aragon");
            assert_eq!(
                message,
                "Error: listen EADDRINUSE: address already in use :::3000"
            );
        }
        other => panic!("expected pattern failure, got {:?}", other),
    }
    assert_eq!(service.state(), ServiceState::Failed);
    assert!(!service.is_alive());
    assert!(service.endpoint().is_none());
}

#[tokio::test]
async fn test_marker_split_across_reads() {
    init_logging();
    let matcher = ReadinessMatcher::new().with_success("Daemon is ready").unwrap();
    let mut service = Service::new(
        sh(
            "ipfs",
            "printf 'Daemon is re'; sleep 0.3; printf 'ady\\n'; sleep 30",
        ),
        settings(Lifecycle::LongRunning),
        matcher,
    );

    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Running);
    service.stop();
}

#[tokio::test]
async fn test_timeout_kills_process() {
    init_logging();
    let mut service = Service::new(
        sh("node", "echo 'Compiling...'; sleep 30"),
        lido_launch::SupervisorSettings {
            timeout_polls: 5,
            ..settings(Lifecycle::LongRunning)
        },
        dev_server_matcher(),
    );

    let started = Instant::now();
    let err = service.start().await.unwrap_err();

    assert!(matches!(err, ProcessError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(service.state(), ServiceState::Failed);
    assert!(!service.is_alive());
    assert!(service.pid().is_none());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    init_logging();
    let mut service = daemon(
        "apps:oracle",
        "echo 'Server running at http://localhost:3011 '; echo 'Built in 1s'; sleep 30",
    );

    // Before start
    service.stop();
    assert_eq!(service.state(), ServiceState::NotStarted);

    service.start().await.unwrap();
    service.stop();
    service.stop();
    assert_eq!(service.state(), ServiceState::Stopped);

    // Restart after stop
    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Running);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    init_logging();
    let mut service = daemon(
        "apps:nos",
        "echo 'Server running at http://localhost:3012 '; echo 'Built in 1s'; sleep 30",
    );

    service.start().await.unwrap();
    let err = service.start().await.unwrap_err();
    assert!(matches!(err, ProcessError::AlreadyRunning(_)));
    assert_eq!(service.state(), ServiceState::Running);
}

#[tokio::test]
async fn test_task_completes() {
    init_logging();
    let mut service = Service::new(
        sh(
            "contracts",
            "echo 'Compiled 42 Solidity files successfully'",
        ),
        settings(Lifecycle::OneShot),
        ReadinessMatcher::new(),
    );

    service.start().await.unwrap();

    assert_eq!(service.state(), ServiceState::Completed);
    assert!(!service.is_alive());
    assert!(service.endpoint().is_none());
    assert!(service.output().stdout().contains("Compiled 42"));
}

#[tokio::test]
async fn test_stop_discards_finished_task() {
    init_logging();
    let mut service = Service::new(
        sh(
            "contracts",
            "echo 'Compiled 42 Solidity files successfully'",
        ),
        settings(Lifecycle::OneShot),
        ReadinessMatcher::new(),
    );

    service.start().await.unwrap();
    assert_eq!(service.state(), ServiceState::Completed);

    service.stop();
    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(service.output().is_empty());
}

#[tokio::test]
async fn test_task_failure_carries_hint() {
    init_logging();
    let matcher = ReadinessMatcher::new()
        .with_hint(
            "Error: Cannot create instance of ENS",
            "remove deployed-localhost.json and try again",
        )
        .unwrap();
    let mut service = Service::new(
        sh(
            "deploy-aragon-env",
            "echo 'Deploying ENS'; \
             echo 'Error: Cannot create instance of ENS; no code at address 0x5f6F' >&2; exit 1",
        ),
        settings(Lifecycle::OneShot),
        matcher,
    );

    let err = service.start().await.unwrap_err();
    match err {
        ProcessError::Exited { code, message, .. } => {
            assert_eq!(code, Some(1));
            assert!(message.contains("Cannot create instance of ENS"));
            let hint = "remove deployed-localhost.json and try again";
            assert!(message.ends_with(hint));
        }
        other => panic!("expected exit failure, got {:?}", other),
    }
    assert_eq!(service.state(), ServiceState::Failed);
}

#[tokio::test]
async fn test_task_failure_reports_error_line() {
    init_logging();
    let matcher = ReadinessMatcher::new()
        .with_error(r"Error HH\d+:")
        .unwrap()
        .with_error_stream(lido_launch::config::StreamSelector::Any);
    let mut service = Service::new(
        sh(
            "contracts",
            "echo 'Error HH700: Artifact for contract \"Lido\" not found.'; exit 1",
        ),
        settings(Lifecycle::OneShot),
        matcher,
    );

    let err = service.start().await.unwrap_err();
    match err {
        ProcessError::PatternFailure { message, .. } => {
            assert_eq!(
                message,
                "Error HH700: Artifact for contract \"Lido\" not found."
            );
        }
        other => panic!("expected pattern failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_spawn_failure() {
    init_logging();
    let mut service = Service::new(
        ProcessConfig::new("ipfs", "/nonexistent/lido/ipfs"),
        settings(Lifecycle::LongRunning),
        dev_server_matcher(),
    );

    let err = service.start().await.unwrap_err();
    assert!(matches!(err, ProcessError::SpawnFailed { .. }));
    assert_eq!(service.state(), ServiceState::Failed);

    // Nothing to kill, but the service is still discarded
    service.stop();
    assert_eq!(service.state(), ServiceState::Stopped);
    assert!(!service.is_alive());
}

#[tokio::test]
async fn test_daemon_exiting_before_ready() {
    init_logging();
    let mut service = daemon("node", "echo 'Cannot find module hardhat'; exit 3");

    let err = service.start().await.unwrap_err();
    match err {
        ProcessError::Exited { code, message, .. } => {
            assert_eq!(code, Some(3));
            assert_eq!(message, "Cannot find module hardhat");
        }
        other => panic!("expected exit failure, got {:?}", other),
    }
    assert_eq!(service.state(), ServiceState::Failed);
}

#[tokio::test]
async fn test_check_status_detects_exit() {
    init_logging();
    let mut service = daemon(
        "apps:lido",
        "echo 'Server running at http://localhost:3010 '; echo 'Built in 1s'; sleep 0.3; exit 2",
    );

    service.start().await.unwrap();
    assert_eq!(service.check_status(), ServiceState::Running);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(service.check_status(), ServiceState::Failed);
    assert!(service.endpoint().is_none());
    assert!(!service.is_alive());
}
