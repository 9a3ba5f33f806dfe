//! # render_node: render farm worker
//!
//! ## Startup Sequence
//!
//! 1. Parse arguments and load the engines file.
//! 2. Build the render registry from the enabled engines.
//! 3. Connect to NATS (retrying forever) and follow the manager's queue
//!    priorities until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use render_net::{ManagerClient, NatsConnector};
use render_node::{Args, Dispatcher, NodeConfig, Worker};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "render_node=info,render_engine=info,render_net=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = NodeConfig::from_args(Args::parse())?;
    let registry = config.build_registry();
    if registry.engine_types().is_empty() {
        warn!("no render engines enabled, this node will never accept a job");
    }
    info!(
        node = %config.node_name,
        engines = ?registry.engine_types(),
        scene_path = %config.scene_path.display(),
        "render node starting"
    );

    let manager = ManagerClient::new(&config.manager_url);
    let dispatcher = Dispatcher::new(registry, manager, config.check_interval);
    let connector = NatsConnector::new(&config.nats_url, &config.node_name);
    let mut worker = Worker::new(connector, dispatcher)
        .with_reconnect_delay(config.reconnect_delay)
        .with_poll_interval(config.poll_interval);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("received kill command from terminal, shutting down");
        signal.cancel();
    });

    worker.run(shutdown).await;

    info!("render node shut down");
    Ok(())
}
