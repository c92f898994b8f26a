mod agent_manager;
mod allocator;
mod auctioneer;
mod config;
mod error;
mod metrics;
mod registry;
mod session;
mod state;
mod world;

use crate::agent_manager::AgentManager;
use crate::allocator::Allocator;
use crate::auctioneer::Auctioneer;
use crate::config::Config;
use crate::metrics::Metrics;
use crate::state::AllocatorState;
use anyhow::Context;
use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;
    tracing::info!(config = ?config, "Loaded configuration");

    let tasks = match &config.tasks_file {
        Some(path) => world::load_tasks(path)?,
        None => {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            world::generate_tasks(config.num_tasks, config.grid_size, &mut rng)?
        }
    };
    world::check_bounds(&tasks, config.grid_size)?;

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let mut state = AllocatorState::new(config.reward);
    state
        .registry
        .create_tasks(tasks)
        .context("Failed to load tasks into the registry")?;

    let agent_manager = AgentManager::spawn_all(
        &config.agent_specs(),
        &config.execution_profile(),
        config.initial_balance,
        &mut state,
        metrics.clone(),
    )?;

    // Spawn the metrics server
    let metrics_handle = config.metrics_listen_addr.map(|addr| {
        let router = metrics.router();
        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind metrics listener on {addr}"))?;
            tracing::info!(%addr, "Serving metrics");
            axum::serve(listener, router.into_make_service()).await?;
            Ok::<(), anyhow::Error>(())
        })
    });

    tracing::info!(
        tasks = state.registry.len(),
        agents = agent_manager.len(),
        "All services started. Running allocation..."
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut allocator = Allocator::new(
        state,
        Auctioneer::new(config.auction_timeouts(), metrics.clone()),
        config.allocator_config(),
    );

    let result = {
        let run = allocator.run(shutdown_rx);
        tokio::pin!(run);
        tokio::select! {
            res = &mut run => res,
            _ = shutdown_signal() => {
                tracing::info!("Shutdown signal received. Finishing the current round...");
                // The drop of the sender tells the allocator to stop between rounds.
                drop(shutdown_tx);
                run.await
            }
        }
    };

    agent_manager.shutdown(allocator.state_mut()).await;
    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    let summary = result.context("Allocation aborted")?;
    tracing::info!(summary = ?summary, "Allocation summary");
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
    );

    tracing::info!("Orchestrator shut down gracefully.");
    Ok(())
}

/// Listens for OS shutdown signals (SIGINT, SIGTERM) and resolves when one is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
