//! Service orchestrator: dependency-ordered startup and fan-out of peers

use crate::config::{
    self, ArgValue, DeploymentDescriptor, EnabledValue, LaunchProfile,
    ServiceDefinition, ServiceKind, SubstitutionContext, SubstitutionError,
};
use crate::discovery::{self, AppDir, AppManifest, DiscoveryError};
use crate::locator::{LocatorResolver, DEFAULT_GATEWAY};
use crate::runtime::dependency::{DependencyError, DependencyGraph, ResolvedService};
use crate::runtime::process::{
    Lifecycle, ProcessConfig, ProcessError, Service, ServiceState, SupervisorSettings,
};
use crate::runtime::readiness::{Endpoint, ReadinessMatcher};
use crate::runtime::shutdown::{self, ShutdownCoordinator};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Argument naming the network, used to locate the deployment descriptor
pub const NETWORK_ARG: &str = "network";

/// Interval of the steady-state health check
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// What happens to the rest of the run when a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Stop every already-started service when a stage fails
    pub stop_started: bool,
    /// Cancel the remaining fan-out peers on the first peer failure
    pub cancel_peers: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            stop_started: true,
            cancel_peers: true,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Project root directory
    pub project_root: PathBuf,
    /// Groups to include (None = all groups)
    pub include_groups: Option<HashSet<String>>,
    /// Run only these services; their other dependencies are ignored
    pub only: Option<HashSet<String>>,
    /// Services to explicitly disable
    pub disable: HashSet<String>,
    /// Apps root; defaults to the first existing of `apps/`, `../apps/`
    pub apps_root: Option<PathBuf>,
    /// User mapping for the app locator (`name:address,...`)
    pub app_mapping: Option<String>,
    pub ipfs_gateway: String,
    pub verbose: bool,
    pub failure: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            include_groups: None,
            only: None,
            disable: HashSet::new(),
            apps_root: None,
            app_mapping: None,
            ipfs_gateway: DEFAULT_GATEWAY.to_string(),
            verbose: false,
            failure: FailurePolicy::default(),
        }
    }
}

/// Everything one run owns
struct RunContext {
    profile: LaunchProfile,
    subst: SubstitutionContext,
    /// Tracked services in start order
    services: IndexMap<String, Service>,
    descriptor: Option<DeploymentDescriptor>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    ctx: RunContext,
}

/// Launch plan for dry-run mode
#[derive(Debug)]
pub struct LaunchPlan {
    /// Services in launch order
    pub services: Vec<LaunchPlanService>,
    /// Resolved arguments
    pub args: BTreeMap<String, String>,
    /// Global environment
    pub env: BTreeMap<String, String>,
}

/// A service in the launch plan
#[derive(Debug)]
pub struct LaunchPlanService {
    pub name: String,
    pub kind: ServiceKind,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub group: Option<String>,
    pub dependencies: Vec<String>,
    pub timeout: Duration,
    pub locator_env: Option<String>,
    /// Discovered peers of an `apps` service
    pub peers: Vec<AppManifest>,
}

/// Outcome of a successful launch
#[derive(Debug)]
pub struct LaunchSummary {
    pub services: Vec<(String, ServiceState, Option<Endpoint>)>,
    pub dao_address: Option<String>,
    /// Aragon client URL pointing at the deployed DAO
    pub client_url: Option<String>,
}

impl Orchestrator {
    pub fn new(
        profile: LaunchProfile,
        config: OrchestratorConfig,
        arg_overrides: HashMap<String, String>,
    ) -> Result<Self, OrchestratorError> {
        let mut args = HashMap::new();

        for (name, def) in &profile.args {
            args.insert(name.clone(), def.default.as_str());
        }

        for (name, value) in &arg_overrides {
            if !profile.args.contains_key(name) {
                return Err(OrchestratorError::UnknownArgument(name.clone()));
            }
            args.insert(name.clone(), value.clone());
        }

        let subst = SubstitutionContext::new().with_args(args);

        Ok(Self {
            config,
            ctx: RunContext {
                profile,
                subst,
                services: IndexMap::new(),
                descriptor: None,
            },
        })
    }

    /// The resolved value of a profile argument
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.ctx.subst.args.get(name).map(String::as_str)
    }

    /// Determine which services take part in this run
    fn resolve_selected(&self) -> Result<HashSet<String>, OrchestratorError> {
        if let Some(only) = &self.config.only {
            for name in only {
                if !self.ctx.profile.services.contains_key(name) {
                    return Err(DependencyError::UnknownService(name.clone()).into());
                }
            }
        }

        let mut selected = HashSet::new();

        for (name, service) in &self.ctx.profile.services {
            if let Some(only) = &self.config.only {
                if !only.contains(name) {
                    continue;
                }
            }

            if let Some(groups) = &self.config.include_groups {
                match &service.group {
                    Some(group) if groups.contains(group) => {}
                    _ => continue,
                }
            }

            if self.config.disable.contains(name) {
                continue;
            }

            let is_enabled = match &service.enabled {
                EnabledValue::Bool(b) => *b,
                EnabledValue::String(s) => {
                    let resolved = self.ctx.subst.substitute(s).map_err(|e| {
                        OrchestratorError::SubstitutionFailed {
                            context: format!("service '{}' enabled field", name),
                            source: e,
                        }
                    })?;
                    ArgValue::from_str(&resolved).is_truthy()
                }
            };

            if is_enabled {
                selected.insert(name.clone());
            }
        }

        Ok(selected)
    }

    fn build_dependency_graph(&self) -> Result<DependencyGraph, OrchestratorError> {
        let selected = self.resolve_selected()?;
        Ok(DependencyGraph::build(&self.ctx.profile, &selected)?)
    }

    /// Resolve the launch plan without spawning anything.
    ///
    /// Endpoint arguments exported by earlier stages are shown as
    /// `<service_capture>` placeholders.
    pub fn plan(&self) -> Result<LaunchPlan, OrchestratorError> {
        let graph = self.build_dependency_graph()?;

        let mut subst = self.ctx.subst.clone();
        for service in graph.launch_order() {
            let readiness = &service.definition.readiness;
            let optional = readiness.optional_captures.keys();
            for capture in readiness.captures.keys().chain(optional) {
                let arg = capture_arg(&service.name, capture);
                let placeholder = format!("<{}>", arg);
                subst.args.entry(arg).or_insert(placeholder);
            }
        }

        let mut services = Vec::new();
        for resolved in graph.launch_order() {
            let def = &resolved.definition;
            let command = resolve_command(&resolved.name, def, &subst)?;
            let env = resolve_env(&resolved.name, &self.ctx.profile, def, &subst)?;

            let peers = if def.kind == ServiceKind::Apps {
                self.discover(def, &subst)?
            } else {
                Vec::new()
            };

            services.push(LaunchPlanService {
                name: resolved.name.clone(),
                kind: def.kind,
                command,
                env: env.into_iter().collect(),
                group: def.group.clone(),
                dependencies: resolved.dependencies.clone(),
                timeout: Duration::from_millis(def.poll_interval_ms) * def.timeout_polls,
                locator_env: def.locator_env.clone(),
                peers,
            });
        }

        let env = global_env(&self.ctx.profile, &subst)?;

        Ok(LaunchPlan {
            services,
            args: self.ctx.subst.args.clone().into_iter().collect(),
            env: env.into_iter().collect(),
        })
    }

    /// Start every selected service, stage by stage.
    ///
    /// Returns on the first failure, or with `Interrupted` once shutdown is
    /// requested. Started services stay tracked either way.
    pub async fn launch(
        &mut self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), OrchestratorError> {
        let graph = self.build_dependency_graph()?;

        // Manifests are read before anything spawns; commands are built
        // when the stage runs so they can use exported endpoints
        let mut found_apps = HashMap::new();
        for resolved in graph.launch_order() {
            if resolved.definition.kind == ServiceKind::Apps {
                found_apps.insert(resolved.name.clone(), self.scan_apps()?);
            }
        }

        log::info!("Launching {} services...", graph.services.len());

        for resolved in graph.launch_order() {
            if *shutdown_rx.borrow() {
                log::info!("Shutdown requested, aborting launch");
                return Err(OrchestratorError::Interrupted);
            }

            match resolved.definition.kind {
                ServiceKind::Daemon | ServiceKind::Task => {
                    let service = self.build_service(resolved, None)?;
                    self.start_single(service, &mut shutdown_rx).await?;
                }
                ServiceKind::Apps => {
                    let found = found_apps.remove(&resolved.name).unwrap_or_default();
                    self.start_peers(resolved, &found, &shutdown_rx).await?;
                }
            }
        }

        self.refresh_descriptor();

        log::info!("All services launched successfully");
        Ok(())
    }

    /// Launch, applying the failure policy through `coordinator`
    pub async fn run(
        &mut self,
        coordinator: &ShutdownCoordinator,
    ) -> Result<(), OrchestratorError> {
        let result = self.launch(coordinator.subscribe()).await;

        if let Err(e) = &result {
            let interrupted = matches!(e, OrchestratorError::Interrupted);
            if interrupted || self.config.failure.stop_started {
                coordinator.stop_all(self.services_mut());
            } else {
                log::warn!("Keeping started services running after failure");
            }
        }

        result
    }

    /// Track a service, start it and wait for its readiness
    async fn start_single(
        &mut self,
        service: Service,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), OrchestratorError> {
        let name = service.name().to_string();
        let (index, _) = self.ctx.services.insert_full(name.clone(), service);
        let service = &mut self.ctx.services[index];

        let result = tokio::select! {
            result = service.start() => result,
            _ = shutdown::requested(shutdown_rx) => {
                log::info!("[{}] Startup interrupted", name);
                return Err(OrchestratorError::Interrupted);
            }
        };
        result?;

        if let Some(endpoint) = service.endpoint().cloned() {
            self.export_captures(&name, &endpoint);
        }
        Ok(())
    }

    /// Start one daemon per discovered app concurrently and wait for all of
    /// them.
    async fn start_peers(
        &mut self,
        resolved: &ResolvedService,
        found: &[AppDir],
        shutdown_rx: &watch::Receiver<bool>,
    ) -> Result<(), OrchestratorError> {
        let apps =
            discovery::expand_commands(found, &resolved.definition.command, &self.ctx.subst)?;
        if apps.is_empty() {
            log::warn!("[{}] No apps to start", resolved.name);
            return Ok(());
        }

        log::info!("[{}] Starting {} apps...", resolved.name, apps.len());

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut peers = JoinSet::new();
        let mut slots: Vec<Option<Service>> = Vec::with_capacity(apps.len());

        for (index, app) in apps.iter().enumerate() {
            let mut service = self.build_service(resolved, Some(app))?;
            let mut cancel = cancel_rx.clone();
            let mut stop_rx = shutdown_rx.clone();
            slots.push(None);

            peers.spawn(async move {
                let name = service.name().to_string();
                let result = tokio::select! {
                    result = service.start() => result,
                    _ = shutdown::requested(&mut cancel) => Err(ProcessError::Cancelled(name)),
                    _ = shutdown::requested(&mut stop_rx) => Err(ProcessError::Cancelled(name)),
                };
                if matches!(result, Err(ProcessError::Cancelled(_))) {
                    service.stop();
                }
                (index, service, result)
            });
        }

        let mut first_failure: Option<OrchestratorError> = None;
        while let Some(joined) = peers.join_next().await {
            let (index, service, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("[{}] Peer task failed: {}", resolved.name, e);
                    first_failure.get_or_insert(OrchestratorError::Join(e));
                    if self.config.failure.cancel_peers {
                        let _ = cancel_tx.send(true);
                    }
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    if let Some(endpoint) = service.endpoint().cloned() {
                        self.export_captures(service.name(), &endpoint);
                    }
                }
                Err(e) if first_failure.is_none() => {
                    let error = if *shutdown_rx.borrow() {
                        OrchestratorError::Interrupted
                    } else {
                        OrchestratorError::Service(e)
                    };
                    first_failure = Some(error);
                    if self.config.failure.cancel_peers {
                        let _ = cancel_tx.send(true);
                    }
                }
                Err(e) => log::debug!("{}", e),
            }
            slots[index] = Some(service);
        }

        // Track in start order so teardown stays reverse-ordered
        for service in slots.into_iter().flatten() {
            let name = service.name().to_string();
            self.ctx.services.insert(name, service);
        }

        match first_failure {
            Some(e) => Err(e),
            None => {
                log::info!("[{}] All {} apps ready", resolved.name, apps.len());
                Ok(())
            }
        }
    }

    fn scan_apps(&self) -> Result<Vec<AppDir>, OrchestratorError> {
        let root =
            discovery::resolve_root(self.config.apps_root.as_deref(), &self.config.project_root)?;
        match root {
            Some(root) => Ok(discovery::scan_apps(&root)?),
            None => {
                log::info!("No apps directory found");
                Ok(Vec::new())
            }
        }
    }

    fn discover(
        &self,
        def: &ServiceDefinition,
        subst: &SubstitutionContext,
    ) -> Result<Vec<AppManifest>, OrchestratorError> {
        let found = self.scan_apps()?;
        Ok(discovery::expand_commands(&found, &def.command, subst)?)
    }

    /// Create the supervisor for a service, or for one app peer of it
    fn build_service(
        &mut self,
        resolved: &ResolvedService,
        app: Option<&AppManifest>,
    ) -> Result<Service, OrchestratorError> {
        let def = &resolved.definition;

        let mut subst = self.ctx.subst.clone();
        let (name, argv) = match app {
            Some(app) => {
                subst.set_arg(config::APP_DIR_ARG, app.dir.to_string_lossy().into_owned());
                let name = format!("{}:{}", resolved.name, app.name);
                (name, app.command.clone())
            }
            None => {
                let argv = resolve_command(&resolved.name, def, &subst)?;
                (resolved.name.clone(), argv)
            }
        };

        let Some((executable, args)) = argv.split_first() else {
            return Err(OrchestratorError::InvalidService(format!(
                "Service '{}' has an empty command",
                name
            )));
        };

        let mut env = resolve_env(&name, &self.ctx.profile, def, &subst)?;
        if let Some(var) = &def.locator_env {
            if let Some(locator) = self.resolve_locator(&name) {
                env.insert(var.clone(), locator);
            }
        }

        let working_dir = match &def.working_dir {
            Some(dir) => {
                let dir = subst.substitute(dir).map_err(|e| OrchestratorError::SubstitutionFailed {
                    context: format!("service '{}' working_dir", name),
                    source: e,
                })?;
                Some(self.config.project_root.join(dir))
            }
            None => None,
        };

        let matcher = ReadinessMatcher::from_spec(&def.readiness)
            .map_err(|e| OrchestratorError::InvalidPattern {
                service: name.clone(),
                source: e,
            })?
            .map_hints(|hint| subst.substitute(hint).unwrap_or_else(|_| hint.to_string()));

        let settings = SupervisorSettings {
            poll_interval: Duration::from_millis(def.poll_interval_ms),
            timeout_polls: def.timeout_polls,
            lifecycle: match def.kind {
                ServiceKind::Task => Lifecycle::OneShot,
                ServiceKind::Daemon | ServiceKind::Apps => Lifecycle::LongRunning,
            },
            verbose: self.config.verbose,
        };

        let config = ProcessConfig {
            name,
            executable: executable.clone(),
            args: args.to_vec(),
            env: env.into_iter().collect(),
            working_dir,
        };

        Ok(Service::new(config, settings, matcher))
    }

    /// Locator string for the Aragon client, if a mapping and a descriptor
    /// are both available
    fn resolve_locator(&mut self, service: &str) -> Option<String> {
        let mapping = self.config.app_mapping.clone()?;

        // A deploy stage of this run may have just written the descriptor
        self.refresh_descriptor();
        let Some(descriptor) = &self.ctx.descriptor else {
            log::warn!("[{service}] No deployment descriptor, app locator not set");
            return None;
        };

        let locator = LocatorResolver::new(descriptor)
            .with_gateway(self.config.ipfs_gateway.clone())
            .to_locator_string(&mapping);

        if locator.is_empty() {
            log::warn!("[{service}] No apps in '{mapping}' matched the deployment");
            return None;
        }

        log::info!("[{}] App locator: {}", service, locator);
        Some(locator)
    }

    fn refresh_descriptor(&mut self) {
        let network = self.arg(NETWORK_ARG).unwrap_or("localhost").to_string();
        match config::descriptor::find(&self.config.project_root, &network) {
            Ok(found) => self.ctx.descriptor = found.map(|(descriptor, _)| descriptor),
            Err(e) => log::warn!("{}", e),
        }
    }

    /// Make a ready service's captures available to later stages
    fn export_captures(&mut self, service: &str, endpoint: &Endpoint) {
        for (capture, value) in endpoint.iter() {
            let arg = capture_arg(service, capture);
            log::debug!("Exporting $(arg {}) = {}", arg, value);
            self.ctx.subst.set_arg(arg, value);
        }
    }

    /// Block until shutdown is requested or no tracked service is alive
    pub async fn wait(&mut self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown::requested(&mut shutdown_rx) => {
                    log::info!("Shutdown signal received");
                    break;
                }

                _ = tokio::time::sleep(STATUS_INTERVAL) => {
                    let mut any_alive = false;
                    for service in self.ctx.services.values_mut() {
                        service.check_status();
                        if service.is_alive() {
                            any_alive = true;
                        }
                    }
                    if !any_alive {
                        log::info!("All services have stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Tracked services in start order
    pub fn services_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut Service> {
        self.ctx.services.values_mut()
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.ctx.services.get(name)
    }

    pub fn status(&self) -> Vec<(&str, ServiceState)> {
        self.ctx
            .services
            .iter()
            .map(|(name, service)| (name.as_str(), service.state()))
            .collect()
    }

    pub fn summary(&self) -> LaunchSummary {
        let services = self
            .ctx
            .services
            .iter()
            .map(|(name, service)| (name.clone(), service.state(), service.endpoint().cloned()))
            .collect();

        let dao_address = self
            .ctx
            .descriptor
            .as_ref()
            .map(|d| d.dao_address.clone())
            .filter(|a| !a.is_empty());

        let client_url = self
            .ctx
            .profile
            .services
            .iter()
            .filter(|(_, def)| def.locator_env.is_some())
            .find_map(|(name, _)| self.ctx.services.get(name)?.endpoint()?.url())
            .zip(dao_address.as_deref())
            .map(|(url, dao)| format!("{}/#/{}", url.trim_end_matches('/'), dao));

        LaunchSummary {
            services,
            dao_address,
            client_url,
        }
    }
}

/// Arg name a capture is exported under, e.g. `node_url`
pub fn capture_arg(service: &str, capture: &str) -> String {
    let service: String = service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}", service, capture)
}

fn resolve_command(
    name: &str,
    def: &ServiceDefinition,
    subst: &SubstitutionContext,
) -> Result<Vec<String>, OrchestratorError> {
    let substitute = |template: &[String], what: &str| {
        subst
            .substitute_all(template)
            .map_err(|e| OrchestratorError::SubstitutionFailed {
                context: format!("service '{}' {}", name, what),
                source: e,
            })
    };

    let mut argv = substitute(&def.command, "command")?;
    for (arg, extra) in &def.optional_args {
        if subst.is_set(arg) {
            argv.extend(substitute(extra, &format!("optional_args.{}", arg))?);
        }
    }

    Ok(argv)
}

fn global_env(
    profile: &LaunchProfile,
    subst: &SubstitutionContext,
) -> Result<IndexMap<String, String>, OrchestratorError> {
    let mut env = IndexMap::new();
    for (key, value) in &profile.env {
        let resolved = subst
            .substitute(value)
            .map_err(|e| OrchestratorError::SubstitutionFailed {
                context: format!("global env '{}'", key),
                source: e,
            })?;
        if !resolved.is_empty() {
            env.insert(key.clone(), resolved);
        }
    }
    Ok(env)
}

/// Global env overlaid with service env; empty values are left out
fn resolve_env(
    name: &str,
    profile: &LaunchProfile,
    def: &ServiceDefinition,
    subst: &SubstitutionContext,
) -> Result<IndexMap<String, String>, OrchestratorError> {
    let mut env = global_env(profile, subst)?;

    for (key, value) in &def.env {
        let resolved = subst
            .substitute(value)
            .map_err(|e| OrchestratorError::SubstitutionFailed {
                context: format!("service '{}' env '{}'", name, key),
                source: e,
            })?;
        if resolved.is_empty() {
            env.shift_remove(key);
        } else {
            env.insert(key.clone(), resolved);
        }
    }

    Ok(env)
}

/// Errors that can occur while orchestrating a run
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Unknown argument: {0}")]
    UnknownArgument(String),

    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Substitution failed in {context}: {source}")]
    SubstitutionFailed {
        context: String,
        #[source]
        source: SubstitutionError,
    },

    #[error("Invalid pattern for service '{service}': {source}")]
    InvalidPattern {
        service: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid service configuration: {0}")]
    InvalidService(String),

    #[error("App discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Service(#[from] ProcessError),

    #[error("Peer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Interrupted by shutdown request")]
    Interrupted,
}

impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;

        if !self.args.is_empty() {
            writeln!(f, "Arguments:")?;
            for (key, value) in &self.args {
                writeln!(f, "  {}: {}", key, value)?;
            }
            writeln!(f)?;
        }

        if !self.env.is_empty() {
            writeln!(f, "Global Environment:")?;
            for (key, value) in &self.env {
                writeln!(f, "  {}={}", key, value)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Services (in launch order):")?;
        for (i, service) in self.services.iter().enumerate() {
            writeln!(f)?;
            writeln!(
                f,
                "  {}. {} ({}) {}",
                i + 1,
                service.name,
                kind_label(service.kind),
                service
                    .group
                    .as_ref()
                    .map(|g| format!("[{}]", g))
                    .unwrap_or_default()
            )?;

            if service.kind == ServiceKind::Apps {
                if service.peers.is_empty() {
                    writeln!(f, "     Apps: none found")?;
                }
                for peer in &service.peers {
                    writeln!(f, "     App {}: {}", peer.name, peer.command.join(" "))?;
                }
            } else {
                writeln!(f, "     Command: {}", service.command.join(" "))?;
            }

            if !service.dependencies.is_empty() {
                writeln!(f, "     Depends on: {}", service.dependencies.join(", "))?;
            }

            writeln!(f, "     Timeout: {}s", service.timeout.as_secs())?;

            if let Some(var) = &service.locator_env {
                writeln!(f, "     App locator: {}", var)?;
            }

            let own_env: Vec<_> = service
                .env
                .iter()
                .filter(|(key, value)| self.env.get(*key) != Some(value))
                .collect();
            if !own_env.is_empty() {
                writeln!(f, "     Environment:")?;
                for (key, value) in own_env {
                    writeln!(f, "       {}={}", key, value)?;
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for LaunchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.services.iter().map(|(name, _, _)| name.len());
        let width = names.max().unwrap_or(0);

        writeln!(f, "Services:")?;
        for (name, state, endpoint) in &self.services {
            write!(f, "  {:<width$}  {}", name, state, width = width)?;
            if let Some(endpoint) = endpoint.as_ref().filter(|e| !e.is_empty()) {
                write!(f, "  {}", endpoint)?;
            }
            writeln!(f)?;
        }

        if let Some(dao) = &self.dao_address {
            writeln!(f, "DAO address: {}", dao)?;
        }
        if let Some(url) = &self.client_url {
            writeln!(f, "Aragon client: {}", url)?;
        }

        Ok(())
    }
}

fn kind_label(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Daemon => "daemon",
        ServiceKind::Task => "task",
        ServiceKind::Apps => "apps",
    }
}
