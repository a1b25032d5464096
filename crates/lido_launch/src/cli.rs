//! Command-line interface for lido_launch

use argh::FromArgs;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::locator::DEFAULT_GATEWAY;
use crate::runtime::{FailurePolicy, OrchestratorConfig};

/// Services started by `start fork`
const FORK_SERVICES: &[&str] = &["node", "aragon"];

/// Launcher for the Lido local development environment
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// network name (default: localhost)
    #[argh(option, short = 'n', default = "String::from(\"localhost\")")]
    pub network: String,

    /// mirror raw service output to the console
    #[argh(switch, short = 'v')]
    pub verbose: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,

    /// launch profile merged over the built-in one (default: ./lido.launch.yaml)
    #[argh(option)]
    pub profile: Option<PathBuf>,

    /// directory containing the Lido apps (default: apps/ or ../apps/)
    #[argh(option)]
    pub apps_path: Option<PathBuf>,

    /// apps to serve in the Aragon client (format: name:address,...)
    #[argh(option)]
    pub apps: Option<String>,

    /// IPFS gateway used for content-hash app addresses
    #[argh(option, default = "String::from(DEFAULT_GATEWAY)")]
    pub ipfs_gateway: String,

    /// override profile arguments (format: key:=value)
    #[argh(option, short = 'a', from_str_fn(parse_arg_override))]
    pub arg: Vec<(String, String)>,

    /// keep already-started services running when a stage fails
    #[argh(switch)]
    pub keep_running_on_failure: bool,

    /// let the other apps finish starting when one of them fails
    #[argh(switch)]
    pub keep_peers_on_failure: bool,

    /// show launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Command {
    Start(StartCommand),
    Aragon(AragonCommand),
    Node(NodeCommand),
}

/// Start the environment
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "start")]
pub struct StartCommand {
    #[argh(subcommand)]
    pub mode: StartMode,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum StartMode {
    All(StartAllCommand),
    Fork(StartForkCommand),
}

/// Build, deploy and serve everything from scratch
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "all")]
pub struct StartAllCommand {
    /// only launch services in these groups (comma-separated)
    #[argh(option, short = 'g', from_str_fn(parse_list))]
    pub groups: Option<Vec<String>>,

    /// explicitly disable these services (comma-separated)
    #[argh(option, from_str_fn(parse_list))]
    pub disable: Option<Vec<String>>,
}

/// Fork a live network and run the Aragon client against it
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "fork")]
pub struct StartForkCommand {
    /// JSON-RPC URL to fork from
    #[argh(option)]
    pub fork: String,
}

/// Run only the Aragon client
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "aragon")]
pub struct AragonCommand {}

/// Run only the chain node
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "node")]
pub struct NodeCommand {
    /// JSON-RPC URL to fork from
    #[argh(option)]
    pub fork: Option<String>,
}

/// What a subcommand runs, resolved from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Run only these services (None = every enabled service)
    pub only: Option<HashSet<String>>,
    pub include_groups: Option<HashSet<String>>,
    pub disable: HashSet<String>,
    /// Profile arguments implied by the subcommand
    pub args: HashMap<String, String>,
    /// Delete the network's deployment descriptor first
    pub remove_descriptor: bool,
    /// Print the ENS registry address after startup
    pub print_ens: bool,
}

/// Parse argument override in format "key:=value"
fn parse_arg_override(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, ":=").collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid argument format '{}'. Expected 'key:=value'",
            s
        ));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Parse comma-separated list
fn parse_list(s: &str) -> Result<Vec<String>, String> {
    Ok(s.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

fn names(list: &[&str]) -> HashSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl LaunchArgs {
    /// Profile argument overrides: `--network`, then the subcommand, then `-a`
    pub fn arg_overrides(&self) -> HashMap<String, String> {
        let mut overrides = HashMap::from([("network".to_string(), self.network.clone())]);
        overrides.extend(self.selection().args);
        overrides.extend(self.arg.iter().cloned());
        overrides
    }

    pub fn selection(&self) -> Selection {
        match &self.command {
            Command::Start(StartCommand {
                mode: StartMode::All(all),
            }) => Selection {
                include_groups: all.groups.as_ref().map(|g| g.iter().cloned().collect()),
                disable: all
                    .disable
                    .as_ref()
                    .map(|d| d.iter().cloned().collect())
                    .unwrap_or_default(),
                remove_descriptor: true,
                ..Default::default()
            },
            Command::Start(StartCommand {
                mode: StartMode::Fork(fork),
            }) => Selection {
                only: Some(names(FORK_SERVICES)),
                args: HashMap::from([
                    ("fork".to_string(), fork.fork.clone()),
                    ("aragon_network".to_string(), "mainnet".to_string()),
                ]),
                ..Default::default()
            },
            Command::Aragon(_) => {
                let mut args = HashMap::new();
                if self.network == "mainnet" {
                    args.insert("aragon_network".to_string(), "mainnet".to_string());
                }
                Selection {
                    only: Some(names(&["aragon"])),
                    args,
                    print_ens: true,
                    ..Default::default()
                }
            }
            Command::Node(node) => Selection {
                only: Some(names(&["node"])),
                args: node
                    .fork
                    .iter()
                    .map(|url| ("fork".to_string(), url.clone()))
                    .collect(),
                ..Default::default()
            },
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy {
            stop_started: !self.keep_running_on_failure,
            cancel_peers: !self.keep_peers_on_failure,
        }
    }

    pub fn orchestrator_config(&self, project_root: PathBuf) -> OrchestratorConfig {
        let selection = self.selection();
        OrchestratorConfig {
            project_root,
            include_groups: selection.include_groups,
            only: selection.only,
            disable: selection.disable,
            apps_root: self.apps_path.clone(),
            app_mapping: self.apps.clone().filter(|m| !m.trim().is_empty()),
            ipfs_gateway: self.ipfs_gateway.clone(),
            verbose: self.verbose,
            failure: self.failure_policy(),
        }
    }
}
