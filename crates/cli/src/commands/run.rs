//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::simulation::{Simulation, SimulationConfig};

/// Execute the `run` command
pub async fn run_simulation(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading session");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut session = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load session from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(preset) = args.preset {
        session.preset = preset.into();
        info!(preset = session.preset.as_str(), "Overriding preset from CLI");
    }
    if let Some(staleness_ms) = args.staleness_ms {
        session.sync.staleness_ms = staleness_ms;
        info!(staleness_ms, "Overriding staleness budget from CLI");
    }
    config_loader::ConfigLoader::validate(&session).context("Invalid CLI overrides")?;

    info!(
        preset = session.preset.as_str(),
        devices = session.devices.len(),
        streams = session.stream_count(),
        duration_ms = session.duration_ms,
        "Session loaded"
    );

    if args.dry_run {
        info!("Dry run mode - session is valid, exiting");
        print_session_summary(&session);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let simulation = Simulation::new(SimulationConfig {
        session,
        mode: args.mode,
        speed: args.speed,
        timeout: (args.timeout != 0).then(|| Duration::from_secs(args.timeout)),
        show_frames: args.show_frames,
    });

    let shutdown_signal = setup_shutdown_signal();

    info!("Starting simulation...");

    tokio::select! {
        result = simulation.run() => {
            let stats = result.context("Simulation failed")?;
            info!(
                frames_produced = stats.frames_produced,
                frames_delivered = stats.sync_metrics.total_outputs,
                composites = stats.sync.composites_out,
                duration_secs = stats.duration.as_secs_f64(),
                "Simulation completed"
            );
            stats.print_summary();
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping simulation...");
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_session_summary(session: &contracts::SessionConfig) {
    println!("\n=== Session Summary ===\n");
    println!("Preset: {}", session.preset.as_str());
    println!("Duration: {} ms", session.duration_ms);
    println!("\nDevices ({}):", session.devices.len());
    for device in &session.devices {
        let streams: Vec<String> = device
            .streams
            .iter()
            .map(|s| format!("{}#{}@{}", s.stream_type, s.index, s.fps))
            .collect();
        println!("  - {}: {}", device.id, streams.join(", "));
    }

    let sync = &session.sync;
    println!("\nSync Settings:");
    println!("  Staleness: {} ms", sync.staleness_ms);
    println!("  Fallback fps: {}", sync.fallback_fps);
    println!("  Queue capacity: {}", sync.queue_capacity);
    println!();
}
