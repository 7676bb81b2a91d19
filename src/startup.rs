//! Process wiring: provider, updater, snapshot cache, and xDS server.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Cli;
use crate::config::load_config_from_env;
use crate::errors::Result;
use crate::provider::create_provider;
use crate::services::Updater;
use crate::xds::{start_xds_server, SnapshotCache};

/// Run the control plane until a shutdown signal arrives.
///
/// Fails fast on configuration or provider initialization errors; after
/// startup every runtime error is absorbed and logged by the component it
/// belongs to.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config_from_env()?;
    info!(
        xds_address = %config.xds.socket_address(),
        ingress_port = config.mesh.ingress_port,
        egress_port = config.mesh.egress_port,
        poll_interval_secs = config.updater.poll_interval_secs,
        provider = ?cli.provider,
        "loaded configuration"
    );

    let provider = create_provider(cli.provider, cli.config.as_deref())?;
    let cache = Arc::new(SnapshotCache::new());
    let shutdown = CancellationToken::new();

    let updater = Updater::new(cache.clone(), provider, config.mesh.clone(), &config.updater);
    let updater_handle = tokio::spawn(updater.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    let shutdown_signal = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    };

    let result = start_xds_server(&config.xds, cache, shutdown_signal).await;

    // The server is down; stop the updater as well and let an in-flight
    // tick finish.
    shutdown.cancel();
    let _ = updater_handle.await;

    result
}
