//! Launch profile YAML schema definitions

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::runtime::readiness::ReadinessMatcher;

/// Built-in profile describing the Lido development environment
pub const DEFAULT_PROFILE: &str = include_str!("../../launch/default.launch.yaml");

/// Profile picked up from the working directory when `--profile` is not given
pub const LOCAL_PROFILE_FILE: &str = "lido.launch.yaml";

/// Argument every `apps` command template must reference
pub const APP_DIR_ARG: &str = "app_dir";

/// Root launch profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchProfile {
    /// Profile format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Argument definitions with defaults
    #[serde(default)]
    pub args: IndexMap<String, ArgDefinition>,

    /// Environment variables applied to all services
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Service definitions, in declaration order
    #[serde(default)]
    pub services: IndexMap<String, ServiceDefinition>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Argument definition with default value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgDefinition {
    pub default: ArgValue,
    #[serde(default)]
    pub description: Option<String>,
}

/// Argument values can be strings, booleans, or numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ArgValue {
    pub fn as_str(&self) -> String {
        match self {
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::String(s) => s.clone(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("true") {
            return ArgValue::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return ArgValue::Bool(false);
        }
        if let Ok(i) = s.parse::<i64>() {
            return ArgValue::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return ArgValue::Float(f);
        }
        ArgValue::String(s.to_string())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            ArgValue::Bool(b) => *b,
            ArgValue::Int(i) => *i != 0,
            ArgValue::Float(f) => *f != 0.0,
            ArgValue::String(s) => {
                !s.is_empty()
                    && !s.eq_ignore_ascii_case("false")
                    && !s.eq_ignore_ascii_case("0")
                    && !s.eq_ignore_ascii_case("no")
            }
        }
    }
}

/// How a service reaches its "ready" state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Long-running process, ready once its success marker appears
    #[default]
    Daemon,
    /// One-shot command, ready once it exits with code 0
    Task,
    /// One daemon per sub-application found by discovery, started concurrently
    Apps,
}

/// Output stream an error marker is searched in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSelector {
    Stdout,
    #[default]
    Stderr,
    Any,
}

/// Declarative readiness table for one service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadinessSpec {
    /// Success marker regex
    #[serde(default)]
    pub success: Option<String>,

    /// Named captures that must all be present for a success match
    #[serde(default)]
    pub captures: IndexMap<String, String>,

    /// Named captures extracted when present
    #[serde(default)]
    pub optional_captures: IndexMap<String, String>,

    /// Error marker regex
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub error_stream: StreamSelector,

    /// Regex -> advice appended to a failure message when the regex matches
    #[serde(default)]
    pub hints: IndexMap<String, String>,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    #[serde(default)]
    pub kind: ServiceKind,

    #[serde(default)]
    pub description: Option<String>,

    /// Argv template; the first element is the executable
    pub command: Vec<String>,

    /// Extra argv appended only when the named argument is non-empty
    #[serde(default)]
    pub optional_args: IndexMap<String, Vec<String>>,

    /// Environment variables specific to this service
    #[serde(default)]
    pub env: IndexMap<String, String>,

    #[serde(default)]
    pub working_dir: Option<String>,

    /// Services that must be ready first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Group name for filtering
    #[serde(default)]
    pub group: Option<String>,

    /// Can be a boolean or a string like "$(arg with_ipfs)"
    #[serde(default = "default_enabled")]
    pub enabled: EnabledValue,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Readiness timeout, counted in poll intervals
    #[serde(default = "default_timeout_polls")]
    pub timeout_polls: u32,

    #[serde(default)]
    pub readiness: ReadinessSpec,

    /// Environment variable receiving the resolved app locator string
    #[serde(default)]
    pub locator_env: Option<String>,
}

fn default_enabled() -> EnabledValue {
    EnabledValue::Bool(true)
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_timeout_polls() -> u32 {
    300
}

/// Enabled value can be a direct boolean or a substitution string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnabledValue {
    Bool(bool),
    String(String),
}

impl LaunchProfile {
    /// The profile compiled into the binary
    pub fn builtin() -> Result<Self, ProfileError> {
        Self::from_yaml(DEFAULT_PROFILE)
    }

    /// Built-in profile overlaid with the user's profile.
    ///
    /// `explicit` must exist; otherwise `lido.launch.yaml` in `project_root`
    /// is used when present.
    pub fn load(explicit: Option<&Path>, project_root: &Path) -> Result<Self, ProfileError> {
        let mut profile = Self::builtin()?;

        let overlay_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let local = project_root.join(LOCAL_PROFILE_FILE);
                local.is_file().then_some(local)
            }
        };

        if let Some(path) = overlay_path {
            log::info!("Loading launch profile: {}", path.display());
            // Overlays may reference built-in services, so validate after merging
            let overlay = Self::read_yaml(&path)?;
            profile.merge(overlay);
            profile.validate()?;
        }

        Ok(profile)
    }

    fn read_yaml(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(ProfileError::Parse)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ProfileError> {
        let profile: LaunchProfile = serde_yaml::from_str(content).map_err(ProfileError::Parse)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Overlay another profile: same-name services are replaced, new ones appended
    pub fn merge(&mut self, overlay: LaunchProfile) {
        self.args.extend(overlay.args);
        self.env.extend(overlay.env);
        for (name, service) in overlay.services {
            if self.services.contains_key(&name) {
                log::debug!("Profile overrides service '{}'", name);
            }
            self.services.insert(name, service);
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        for (name, service) in &self.services {
            let executable = service.command.first().map(|exe| exe.trim());
            if executable.map_or(true, str::is_empty) {
                return Err(ProfileError::Validation(format!(
                    "Service '{}': 'command' must name an executable",
                    name
                )));
            }

            if service.poll_interval_ms == 0 {
                return Err(ProfileError::Validation(format!(
                    "Service '{}': 'poll_interval_ms' must be positive",
                    name
                )));
            }

            if service.kind == ServiceKind::Apps {
                let marker = format!("$(arg {})", APP_DIR_ARG);
                if !service.command.iter().any(|arg| arg.contains(&marker)) {
                    return Err(ProfileError::Validation(format!(
                        "Service '{}': apps command must reference {}",
                        name, marker
                    )));
                }
            }

            if service.kind == ServiceKind::Daemon && service.readiness.success.is_none() {
                return Err(ProfileError::Validation(format!(
                    "Service '{}': daemons need a readiness 'success' pattern",
                    name
                )));
            }

            ReadinessMatcher::from_spec(&service.readiness).map_err(|e| {
                ProfileError::Validation(format!("Service '{}': invalid pattern: {}", name, e))
            })?;

            for dep in &service.depends_on {
                if !self.services.contains_key(dep) {
                    return Err(ProfileError::Validation(format!(
                        "Service '{}': depends on unknown service '{}'",
                        name, dep
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get all unique group names
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .services
            .values()
            .filter_map(|s| s.group.clone())
            .collect();
        groups.sort();
        groups.dedup();
        groups
    }
}

/// Errors that can occur when loading a launch profile
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to read launch profile '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse launch profile: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
