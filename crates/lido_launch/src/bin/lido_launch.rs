//! Lido launcher CLI
//!
//! Usage:
//!   lido_launch start all
//!   lido_launch --network goerli --apps Lido:http://localhost:3010 aragon
//!   lido_launch start fork --fork https://mainnet.infura.io/v3/<key>
//!   lido_launch --dry-run start all

use lido_launch::config::descriptor;
use lido_launch::{LaunchArgs, LaunchProfile, Orchestrator, ShutdownCoordinator};

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    let project_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            log::error!("Failed to get current directory: {}", e);
            std::process::exit(1);
        }
    };

    let profile = match LaunchProfile::load(args.profile.as_deref(), &project_root) {
        Ok(profile) => profile,
        Err(e) => {
            log::error!("Failed to load launch profile: {}", e);
            std::process::exit(1);
        }
    };

    let selection = args.selection();
    let config = args.orchestrator_config(project_root.clone());
    let keep_running = !config.failure.stop_started;

    let mut orchestrator = match Orchestrator::new(profile, config, args.arg_overrides()) {
        Ok(o) => o,
        Err(e) => {
            log::error!("Failed to create orchestrator: {}", e);
            std::process::exit(1);
        }
    };

    // Dry run mode
    if args.dry_run {
        match orchestrator.plan() {
            Ok(plan) => {
                println!("{}", plan);
            }
            Err(e) => {
                log::error!("Failed to generate launch plan: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if selection.remove_descriptor {
        match descriptor::remove(&project_root, &args.network) {
            Ok(Some(path)) => println!("removed {}", path.display()),
            Ok(None) => {}
            Err(e @ descriptor::DescriptorError::Protected { .. }) => log::warn!("{}", e),
            Err(e) => {
                log::error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    let coordinator = match ShutdownCoordinator::install() {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = orchestrator.run(&coordinator).await {
        log::error!("Launch failed: {}", e);
        if keep_running && !coordinator.is_triggered() {
            log::info!("Press Ctrl+C to stop the remaining services");
            orchestrator.wait(coordinator.subscribe()).await;
        }
        coordinator.stop_all(orchestrator.services_mut());
        std::process::exit(1);
    }

    println!();
    println!("{}", orchestrator.summary());
    if selection.print_ens {
        let registry = orchestrator
            .service("aragon")
            .and_then(|s| s.endpoint())
            .and_then(|e| e.get("ens_registry"));
        match registry {
            Some(address) => println!("ENS registry: {}", address),
            None => log::warn!("The Aragon client did not report an ENS registry address"),
        }
    }

    // Wait for shutdown signal or all services to exit
    orchestrator.wait(coordinator.subscribe()).await;

    coordinator.stop_all(orchestrator.services_mut());

    log::info!("Lido launcher exiting");
}
