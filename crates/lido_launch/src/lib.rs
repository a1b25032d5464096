//! Lido Launch
//!
//! Bootstraps the Lido local development environment: compiles contracts,
//! runs a chain node and an IPFS daemon, deploys the Aragon DAO, serves the
//! Lido apps and finally starts the Aragon client pointed at them.
//!
//! # Overview
//!
//! Each service is an external process supervised by [`runtime::Service`]:
//! - Output is captured into append-only buffers and matched against the
//!   service's success and error patterns until it is ready
//! - Values such as the RPC URL are extracted from the output and exported
//!   to later stages as `$(arg <service>_<capture>)`
//! - Services start in dependency order; the Lido apps start concurrently
//! - On shutdown every process tree is killed in reverse start order
//!
//! # Example Profile
//!
//! ```yaml
//! version: "1.0"
//!
//! args:
//!   network:
//!     default: localhost
//!
//! services:
//!   node:
//!     command: ["yarn", "hardhat", "node"]
//!     poll_interval_ms: 200
//!     readiness:
//!       success: "Started HTTP and WebSocket JSON-RPC server at"
//!       captures:
//!         url: "JSON-RPC server at (\\S+)"
//!       error: "Error:"
//!
//!   deploy:
//!     kind: task
//!     command: ["yarn", "deploy:dao"]
//!     env:
//!       RPC_URL: "$(arg node_url)"
//!     depends_on:
//!       - node
//! ```

pub mod cli;
pub mod config;
pub mod discovery;
pub mod locator;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{
    DeploymentDescriptor, LaunchProfile, ProfileError, SubstitutionContext, SubstitutionError,
};
pub use discovery::{AppDir, AppManifest, DiscoveryError};
pub use locator::{LocatorEntry, LocatorResolver};
pub use runtime::{
    DependencyError, DependencyGraph, Endpoint, LaunchPlan, LaunchSummary, Orchestrator,
    OrchestratorConfig, OrchestratorError, ProcessConfig, ProcessError, ReadinessMatcher, Service,
    ServiceState, ShutdownCoordinator, SupervisorSettings, Verdict,
};
