//! Test helpers for supervisor and orchestrator integration tests

#![allow(dead_code)]

use lido_launch::runtime::Lifecycle;
use lido_launch::{
    LaunchProfile, Orchestrator, OrchestratorConfig, ProcessConfig, ReadinessMatcher, Service,
    SupervisorSettings,
};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const POLL: Duration = Duration::from_millis(50);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A `/bin/sh -c <script>` process
pub fn sh(name: &str, script: &str) -> ProcessConfig {
    ProcessConfig::new(name, "/bin/sh").with_args(["-c", script])
}

/// Fast polling with a five second budget
pub fn settings(lifecycle: Lifecycle) -> SupervisorSettings {
    SupervisorSettings {
        poll_interval: POLL,
        timeout_polls: 100,
        lifecycle,
        verbose: false,
    }
}

/// Dev-server style matcher: ready on "Built in" once a URL is printed
pub fn dev_server_matcher() -> ReadinessMatcher {
    ReadinessMatcher::new()
        .with_success("Built in")
        .unwrap()
        .with_capture("url", r"Server running at (\S+)")
        .unwrap()
        .with_error("Error:")
        .unwrap()
}

pub fn daemon(name: &str, script: &str) -> Service {
    Service::new(
        sh(name, script),
        settings(Lifecycle::LongRunning),
        dev_server_matcher(),
    )
}

/// Orchestrator over a standalone profile rooted at `project_root`
pub fn orchestrator(
    project_root: &Path,
    yaml: &str,
    configure: impl FnOnce(&mut OrchestratorConfig),
) -> Orchestrator {
    let profile = LaunchProfile::from_yaml(yaml).unwrap();
    let mut config = OrchestratorConfig {
        project_root: project_root.to_path_buf(),
        ..Default::default()
    };
    configure(&mut config);
    Orchestrator::new(profile, config, HashMap::new()).unwrap()
}

/// Create `<root>/apps/<dir>/manifest.json` naming the app
pub fn write_app(root: &Path, dir: &str, name: &str) {
    let app = root.join("apps").join(dir);
    std::fs::create_dir_all(&app).unwrap();
    let manifest = format!(r#"{{"name": "{name}"}}"#);
    std::fs::write(app.join("manifest.json"), manifest).unwrap();
}

pub fn write_descriptor(root: &Path, network: &str) {
    let descriptor = r#"{
        "daoAddress": "0xDA0",
        "app:lido": { "name": "Lido", "id": "0xAA" },
        "app:oracle": { "name": "Oracle", "id": "0xBB" }
    }"#;
    std::fs::write(root.join(format!("deployed-{}.json", network)), descriptor).unwrap();
}
