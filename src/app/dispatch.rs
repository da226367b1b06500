use crate::cli::commands::{Cli, Commands, ServicesCommands};
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Config;
use crate::app::status::{render_check, render_episodes, render_fleet, render_outcome};
use crate::config::{ServiceDefinition, ServiceRegistry};
use crate::controller::{Controller, RunStatus};
use crate::knowledge::{self, ManualsIndex, UNAVAILABLE_MESSAGE};
use crate::memory::EpisodeStore;
use crate::security::SecurityPolicy;
use crate::workflow::{ApprovalDecision, EngineSettings, RemediationEngine};

/// Wire the remote channel, oracle, memory, registry and knowledge base into
/// a controller, restoring any checkpointed run.
pub async fn build_controller(config: &Config) -> Result<Arc<Controller>> {
    let channel = crate::remote::create_channel(&config.remote);
    let oracle = crate::oracle::create_oracle(&config.oracle);
    let memory_dir = config.memory_dir();
    let memory = Arc::new(
        EpisodeStore::open(&memory_dir)
            .with_context(|| format!("failed to open episode store in {}", memory_dir.display()))?,
    );
    let services = ServiceRegistry::load(&config.services_path()).into_shared();

    let mut engine = RemediationEngine::new(
        channel,
        oracle,
        memory,
        services,
        EngineSettings::from_config(config),
    );

    if let Some(index) = load_knowledge(config).await {
        engine = engine.with_knowledge(Arc::new(index));
    }

    let controller =
        Controller::new(Arc::new(engine)).with_checkpoint(config.checkpoint_path());
    Ok(Arc::new(controller))
}

/// Manuals index when the knowledge base is enabled and has content.
async fn load_knowledge(config: &Config) -> Option<ManualsIndex> {
    if !config.knowledge.enabled {
        return None;
    }
    let manuals_dir = config.manuals_dir();
    match ManualsIndex::load(&manuals_dir).await {
        Ok(index) if !index.is_empty() => Some(index),
        Ok(_) => {
            info!(dir = %manuals_dir.display(), "no manuals found, knowledge base disabled");
            None
        }
        Err(e) => {
            warn!(dir = %manuals_dir.display(), "knowledge base unavailable: {e:#}");
            None
        }
    }
}

/// Cancel `token` on the first Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Check { command } => {
            println!("{}", render_check(&SecurityPolicy::new(), &command));
            Ok(())
        }

        Commands::Services { services_command } => handle_services(services_command, &config),

        Commands::Episodes { limit } => {
            let store = EpisodeStore::open(&config.memory_dir())?;
            println!("{}", render_episodes(&store.episodes(), limit, store.summary()));
            Ok(())
        }

        Commands::Status => {
            let controller = build_controller(&config).await?;
            let statuses = controller.fleet_status().await;
            println!("{}", render_fleet(&statuses));
            println!("Memory: {}", controller.memory_summary());
            if controller.status() == RunStatus::Waiting {
                println!("A remediation plan is waiting for approval (sentinel resume --approve|--reject).");
            }
            Ok(())
        }

        Commands::Run => {
            let controller = build_controller(&config).await?;
            if controller.status() == RunStatus::Waiting {
                warn!("discarding the run that was waiting for approval");
            }

            let handle = controller.start()?;
            let stopper = {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        let _ = controller.stop();
                    }
                })
            };
            let outcome = handle.await.context("remediation run task failed")?;
            stopper.abort();

            println!("{}", render_outcome(&outcome, &controller.snapshot().state));
            Ok(())
        }

        Commands::Watch { interval } => {
            let controller = build_controller(&config).await?;
            let secs = interval
                .unwrap_or(config.workflow.monitor_interval_secs)
                .max(1);
            info!(interval_secs = secs, "watch mode started, Ctrl+C to stop");

            let shutdown = CancellationToken::new();
            cancel_on_ctrl_c(shutdown.clone());
            controller.watch(Duration::from_secs(secs), shutdown).await;
            Ok(())
        }

        Commands::Resume { approve, reject } => {
            let decision = match (approve, reject) {
                (true, false) => ApprovalDecision::Approve,
                (false, true) => ApprovalDecision::Reject,
                _ => bail!("pass exactly one of --approve or --reject"),
            };

            let controller = build_controller(&config).await?;
            if controller.status() != RunStatus::Waiting {
                bail!(
                    "No run is waiting for approval (no checkpoint at {})",
                    config.checkpoint_path().display()
                );
            }

            let outcome = controller.resume(decision).await?;
            println!("{}", render_outcome(&outcome, &controller.snapshot().state));
            Ok(())
        }

        Commands::Ask { question } => {
            match load_knowledge(&config).await {
                Some(index) => println!("{}", knowledge::answer(&index, &question).await?),
                None => println!("{UNAVAILABLE_MESSAGE}"),
            }
            Ok(())
        }

        Commands::Gateway { port, host } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            let controller = build_controller(&config).await?;
            crate::gateway::run_gateway(&host, port, controller, &config).await
        }
    }
}

fn handle_services(command: ServicesCommands, config: &Config) -> Result<()> {
    let mut registry = ServiceRegistry::load(&config.services_path());
    match command {
        ServicesCommands::List => {
            if registry.is_empty() {
                println!("No services configured.");
            }
            for service in registry.services() {
                println!(
                    "{:<16} {:<12} check: {}  (healthy when output contains {:?})",
                    service.name, service.kind, service.check_command, service.running_indicator
                );
            }
        }
        ServicesCommands::Add {
            name,
            check,
            indicator,
            kind,
        } => {
            registry.upsert(ServiceDefinition::new(name.clone(), check, indicator, kind))?;
            println!("✓ Service '{name}' saved to {}", config.services_path().display());
        }
        ServicesCommands::Remove { name } => {
            registry.remove(&name)?;
            println!("✓ Service '{name}' removed");
        }
    }
    Ok(())
}
