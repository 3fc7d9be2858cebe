//! topology-relay
//!
//! Public entry point of the two-tier deployment.
//!
//! ```text
//!   Internet
//!      │
//!      ▼
//!  ┌──────────────┐  GET /status   ┌──────────────────────┐
//!  │ load balancer│ POST /submit   │ backend.internal:3005 │
//!  │   (public)   │──▶ relay ─────▶│   (private, internal) │
//!  └──────────────┘   frontend     └──────────────────────┘
//!                    private-frontend   private-backend
//! ```
//!
//! The relay checks every outbound call against the access policy, resolves
//! the backend's internal name afresh, and streams the answer back.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use topology_relay::config::{load_config, ConfigWatcher, RelayConfig};
use topology_relay::http::HttpServer;
use topology_relay::lifecycle::{next_signal, startup, Shutdown, Signal};
use topology_relay::observability::logging::init_logging;
use topology_relay::topology::Deployment;

#[derive(Parser)]
#[command(name = "topology-relay", version, about = "Public relay for the two-tier deployment")]
struct Args {
    /// TOML config file. Defaults are used when omitted.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the config and topology, print the deployment, and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = startup::load_or_default(args.config.as_deref())?;
    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        "topology-relay starting"
    );

    if let Some(spec) = &config.topology {
        let deployment = Deployment::build(spec)?;
        tracing::info!(
            resources = deployment.graph.len(),
            rules = deployment.policy.len(),
            "Topology validated"
        );
        if args.check {
            println!("{deployment}");
        }
    }
    if args.check {
        println!("config OK");
        return Ok(());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %format!("{}:{}", config.upstream.host, config.upstream.port),
        caller = %config.upstream.caller,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    startup::start_metrics(&config.observability);

    let server = HttpServer::new(config.clone())?;
    let listener = startup::bind(&config).await?;

    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel::<RelayConfig>();

    // Keep the watcher alive for the life of the process.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, config.clone());
            let handle = watcher.start()?;
            let tx = reload_tx.clone();
            tokio::spawn(async move {
                while let Some(update) = updates.recv().await {
                    if tx.send(update).is_err() {
                        break;
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    let signal_shutdown = shutdown.clone();
    let config_path = args.config.clone();
    tokio::spawn(async move {
        loop {
            match next_signal().await {
                Ok(Signal::Terminate) => {
                    signal_shutdown.trigger();
                    break;
                }
                Ok(Signal::Reload) => {
                    let Some(path) = &config_path else {
                        tracing::warn!("SIGHUP ignored, no config file");
                        continue;
                    };
                    match load_config(path) {
                        Ok(update) => {
                            let _ = reload_tx.send(update);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Rejected config reload, keeping current configuration");
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                    signal_shutdown.trigger();
                    break;
                }
            }
        }
    });

    server.run(listener, reload_rx, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
