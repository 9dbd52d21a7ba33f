use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ns_suspender::resources::{AwsRds, ExternalDb};
use ns_suspender::{
    run_health_server, run_uptime_counter, run_watcher, Clock, HealthState, KubeInventory,
    Options, Suspender, QUEUE_CAPACITY,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = Arc::new(Options::parse());

    // Install the TLS crypto provider before any TLS operations
    // Note: install_default() may fail if called multiple times (e.g., in tests),
    // but a single failure during startup is fatal since TLS won't work
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    // Initialize logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("ns_suspender={}", opts.log_level).parse()?)
        .add_directive(opts.log_level.parse()?);
    if opts.no_kube_warnings {
        filter = filter.add_directive("kube_client=error".parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ns-suspender launched");

    // The timezone must load before any decision is made
    let clock = Clock::new(&opts.timezone)?;
    info!(timezone = %opts.timezone, "timezone loaded");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");
    if opts.dry_run {
        warn!("dry-run enabled: all writes go through the API server's dry-run mode");
    }

    let inventory = Arc::new(KubeInventory::new(client, opts.dry_run));
    let db: Option<Arc<dyn ExternalDb>> = if opts.rds_enabled {
        info!("RDS driver enabled");
        Some(Arc::new(AwsRds::from_env().await))
    } else {
        None
    };

    // Shared health/metrics state and its HTTP server
    let health = Arc::new(HealthState::new());
    let health_handle = {
        let health = health.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health).await {
                error!("Health server error: {}", e);
            }
        })
    };
    tokio::spawn(run_uptime_counter(health.clone()));

    // Work queue between the two loops; the watcher blocks when it fills up
    let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);

    let shutdown = CancellationToken::new();

    let mut watcher_handle = {
        let inventory = inventory.clone();
        let opts = opts.clone();
        let health = health.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(
            async move { run_watcher(inventory, queue_tx, opts, health, shutdown).await },
        )
    };

    let mut suspender_handle = {
        let suspender = Suspender::new(inventory, db, opts, clock);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { suspender.run(queue_rx, shutdown).await })
    };

    // Wait for a task to die (fatal) or a shutdown signal
    let exit_code = tokio::select! {
        result = &mut watcher_handle => {
            match result {
                Ok(Err(e)) => {
                    error!("watcher failed: {}", e);
                    1
                }
                Err(e) => {
                    error!("watcher task panicked: {}", e);
                    1
                }
                Ok(Ok(())) => 0,
            }
        }
        result = &mut suspender_handle => {
            match result {
                Ok(Err(e)) => {
                    error!("suspender failed: {}", e);
                    1
                }
                Err(e) => {
                    error!("suspender task panicked: {}", e);
                    1
                }
                Ok(Ok(())) => 0,
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
            1
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            health.set_ready(false).await;
            shutdown.cancel();
            // let both loops notice the token and wind down
            let _ = watcher_handle.await;
            let _ = suspender_handle.await;
            0
        }
    };

    info!("ns-suspender stopped");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
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
