//! Supervised service process

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::output::{self, OutputBuffer, OutputChunk, OutputStream};
use super::readiness::{Endpoint, ReadinessMatcher, Verdict};
use super::tree;

/// How long to wait for the last output of an exited child
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Lines of output quoted when a failure has no matched error line
const TAIL_LINES: usize = 10;

/// Service lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    /// Spawned, waiting for readiness
    Starting,
    /// Ready; endpoint available
    Running,
    /// One-shot task exited successfully
    Completed,
    Failed,
    Stopped,
}

impl ServiceState {
    pub fn is_active(&self) -> bool {
        matches!(self, ServiceState::Starting | ServiceState::Running)
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceState::NotStarted => "not started",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Completed => "completed",
            ServiceState::Failed => "failed",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What "ready" means for a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Ready when the success marker appears; keeps running afterwards
    #[default]
    LongRunning,
    /// Ready when the process exits with code 0
    OneShot,
}

/// Configuration for spawning a process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Service name (for logging)
    pub name: String,
    pub executable: String,
    pub args: Vec<String>,
    /// Added to the inherited environment
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessConfig {
    pub fn new(name: impl Into<String>, executable: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Executable and arguments joined for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Polling parameters for one service
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    /// Readiness timeout, counted in poll intervals
    pub timeout_polls: u32,
    pub lifecycle: Lifecycle,
    /// Mirror raw child output to the console
    pub verbose: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout_polls: 300,
            lifecycle: Lifecycle::LongRunning,
            verbose: false,
        }
    }
}

impl SupervisorSettings {
    /// Total time allowed before readiness
    pub fn timeout(&self) -> Duration {
        self.poll_interval * self.timeout_polls
    }
}

/// One external process, its captured output and its readiness state.
///
/// The child handle is present exactly while the service is starting or
/// running. Dropping a service stops it.
pub struct Service {
    config: ProcessConfig,
    settings: SupervisorSettings,
    matcher: ReadinessMatcher,
    state: ServiceState,
    output: OutputBuffer,
    child: Option<Child>,
    pid: Option<u32>,
    output_rx: Option<mpsc::UnboundedReceiver<OutputChunk>>,
    forwarder: Option<JoinHandle<()>>,
    endpoint: Option<Endpoint>,
    started_at: Option<Instant>,
}

impl Service {
    pub fn new(
        config: ProcessConfig,
        settings: SupervisorSettings,
        matcher: ReadinessMatcher,
    ) -> Self {
        Self {
            config,
            settings,
            matcher,
            state: ServiceState::NotStarted,
            output: OutputBuffer::new(),
            child: None,
            pid: None,
            output_rx: None,
            forwarder: None,
            endpoint: None,
            started_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Extracted connection data; only present while running
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        self.child.is_some()
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Spawn the process and wait until it is ready, fails or times out.
    ///
    /// On any failure the process tree is already terminated when this
    /// returns.
    pub async fn start(&mut self) -> Result<(), ProcessError> {
        if self.state.is_active() || self.child.is_some() {
            return Err(ProcessError::AlreadyRunning(self.config.name.clone()));
        }

        self.output.clear();
        self.endpoint = None;

        log::info!(
            "[{}] Starting: {}",
            self.config.name,
            self.config.command_line()
        );

        let mut cmd = Command::new(&self.config.executable);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        tree::configure_process_group(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state = ServiceState::Failed;
                log::error!("[{}] Failed to spawn: {}", self.config.name, e);
                return Err(ProcessError::SpawnFailed {
                    name: self.config.name.clone(),
                    source: e,
                });
            }
        };

        self.pid = child.id();
        self.output_rx = Some(output::spawn_readers(&mut child));
        self.child = Some(child);
        self.started_at = Some(Instant::now());
        self.state = ServiceState::Starting;

        let result = match self.settings.lifecycle {
            Lifecycle::LongRunning => self.await_ready().await,
            Lifecycle::OneShot => self.await_completion().await,
        };

        if let Err(e) = &result {
            self.kill_tree();
            self.state = ServiceState::Failed;
            log::error!("[{}] {}", self.config.name, e);
        }

        result
    }

    async fn await_ready(&mut self) -> Result<(), ProcessError> {
        let mut remaining = self.settings.timeout_polls;

        loop {
            self.drain_pending();

            let verdict = {
                let (stdout, stderr) = (self.output.stdout(), self.output.stderr());
                self.matcher.evaluate(&stdout, &stderr)
            };
            match verdict {
                Verdict::Ready(endpoint) => {
                    self.mark_running(endpoint);
                    return Ok(());
                }
                Verdict::Failed(message) => {
                    return Err(ProcessError::PatternFailure {
                        name: self.config.name.clone(),
                        message,
                    });
                }
                Verdict::Pending => {}
            }

            if let Some(code) = self.try_exit()? {
                self.drain_until_closed().await;
                return Err(self.exit_error(code));
            }

            if remaining == 0 {
                return Err(ProcessError::Timeout {
                    name: self.config.name.clone(),
                    waited: self.settings.timeout(),
                });
            }
            remaining -= 1;

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn await_completion(&mut self) -> Result<(), ProcessError> {
        let mut remaining = self.settings.timeout_polls;

        loop {
            self.drain_pending();

            if let Some(code) = self.try_exit()? {
                self.drain_until_closed().await;
                if code == Some(0) {
                    self.output_rx = None;
                    self.pid = None;
                    self.state = ServiceState::Completed;
                    log::info!(
                        "[{}] Completed in {:.1}s",
                        self.config.name,
                        self.uptime().unwrap_or_default().as_secs_f64()
                    );
                    return Ok(());
                }
                return Err(self.exit_error(code));
            }

            if remaining == 0 {
                return Err(ProcessError::Timeout {
                    name: self.config.name.clone(),
                    waited: self.settings.timeout(),
                });
            }
            remaining -= 1;

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    fn mark_running(&mut self, endpoint: Endpoint) {
        if endpoint.is_empty() {
            log::info!("[{}] Ready", self.config.name);
        } else {
            log::info!("[{}] Ready: {}", self.config.name, endpoint);
        }

        self.endpoint = Some(endpoint);
        self.state = ServiceState::Running;

        if let Some(rx) = self.output_rx.take() {
            self.forwarder = Some(output::spawn_forwarder(
                self.config.name.clone(),
                rx,
                self.settings.verbose,
            ));
        }
    }

    /// Move every chunk already read into the buffer
    fn drain_pending(&mut self) {
        let Some(rx) = self.output_rx.as_mut() else {
            return;
        };
        while let Ok(chunk) = rx.try_recv() {
            output::mirror(&self.config.name, &chunk, self.settings.verbose);
            self.output.append(&chunk);
        }
    }

    /// Collect output until both pipes close or the grace period ends.
    ///
    /// Grandchildren holding the pipes open would otherwise block forever.
    async fn drain_until_closed(&mut self) {
        let Some(rx) = self.output_rx.as_mut() else {
            return;
        };

        let deadline = tokio::time::sleep(EXIT_DRAIN_GRACE);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        output::mirror(&self.config.name, &chunk, self.settings.verbose);
                        self.output.append(&chunk);
                    }
                    None => break,
                },
                _ = &mut deadline => break,
            }
        }
    }

    /// Exit code if the child has exited; clears the handle
    fn try_exit(&mut self) -> Result<Option<Option<i32>>, ProcessError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(Some(None));
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                Ok(Some(status.code()))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ProcessError::Io {
                name: self.config.name.clone(),
                source: e,
            }),
        }
    }

    fn exit_error(&self, code: Option<i32>) -> ProcessError {
        let stdout = self.output.stdout();
        let stderr = self.output.stderr();

        if let Some(message) = self.matcher.find_error(&stdout, &stderr) {
            return ProcessError::PatternFailure {
                name: self.config.name.clone(),
                message,
            };
        }

        let mut message = self.output.tail(OutputStream::Stderr, TAIL_LINES);
        if message.is_empty() {
            message = self.output.tail(OutputStream::Stdout, TAIL_LINES);
        }
        if let Some(hint) = self.matcher.hint(&stdout, &stderr) {
            message = format!("{}\n{}", message, hint);
        }

        ProcessError::Exited {
            name: self.config.name.clone(),
            code,
            message,
        }
    }

    /// Re-check a started service; records an unexpected exit
    pub fn check_status(&mut self) -> ServiceState {
        let Some(child) = self.child.as_mut() else {
            return self.state;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                log::warn!("[{}] Exited unexpectedly ({})", self.config.name, status);
                self.child = None;
                self.pid = None;
                self.endpoint = None;
                self.state = if status.success() {
                    ServiceState::Stopped
                } else {
                    ServiceState::Failed
                };
            }
            Ok(None) => {}
            Err(e) => {
                log::error!(
                    "[{}] Error checking process status: {}",
                    self.config.name,
                    e
                );
            }
        }

        self.state
    }

    /// Kill the process tree without changing state
    fn kill_tree(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.output_rx = None;

        let pid = self.pid.take();
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Some(pid) = pid {
            tree::terminate_tree(pid);
        }
        if let Err(e) = child.start_kill() {
            log::debug!("[{}] Kill: {}", self.config.name, e);
        }
        // Reap if already gone; otherwise tokio reaps it in the background
        let _ = child.try_wait();
    }

    /// Terminate the process tree and discard captured state.
    ///
    /// Safe to call any number of times, including before `start`. Every
    /// started service ends up `Stopped`, finished or not.
    pub fn stop(&mut self) {
        if self.state == ServiceState::NotStarted {
            return;
        }

        if self.child.is_some() {
            log::info!("[{}] Stopping...", self.config.name);
        }
        self.kill_tree();
        self.state = ServiceState::Stopped;
        self.endpoint = None;
        self.output.clear();
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// Errors that can occur with supervised services
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Service '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Failed to spawn '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Service '{name}' failed:\n{message}")]
    PatternFailure { name: String, message: String },

    #[error("Service '{name}' not ready after {waited:?}")]
    Timeout { name: String, waited: Duration },

    #[error("Service '{name}' exited with {}:\n{message}", describe_exit(.code))]
    Exited {
        name: String,
        code: Option<i32>,
        message: String,
    },

    #[error("Service '{0}' was cancelled")]
    Cancelled(String),

    #[error("Failed to check '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
