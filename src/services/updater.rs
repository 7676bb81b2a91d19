//! The updater loop: the sole writer into the snapshot cache.
//!
//! Polls the provider, reconciles the inventory, and publishes one snapshot
//! per node. A failed poll or reconciliation aborts only the current tick;
//! the previous snapshots stay current and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{MeshConfig, UpdaterConfig};
use crate::errors::Result;
use crate::provider::ServiceProvider;
use crate::xds::resources::compute_version;
use crate::xds::{Snapshot, SnapshotCache};

use super::transform::transform;

/// Glue between a provider and the snapshot cache.
pub struct Updater {
    cache: Arc<SnapshotCache>,
    provider: Box<dyn ServiceProvider>,
    mesh: MeshConfig,
    poll_interval: Duration,
}

impl Updater {
    pub fn new(
        cache: Arc<SnapshotCache>,
        provider: Box<dyn ServiceProvider>,
        mesh: MeshConfig,
        updater: &UpdaterConfig,
    ) -> Self {
        Self { cache, provider, mesh, poll_interval: updater.poll_interval() }
    }

    /// Poll once and publish a snapshot per node. Returns the number of
    /// nodes published.
    pub async fn tick(&self) -> Result<usize> {
        let inventory = self.provider.get_clusters().await?;
        let nodes = transform(&inventory, &self.mesh)?;
        let count = nodes.len();

        for node in nodes {
            let endpoints = node.endpoint_resources();
            let clusters = node.cluster_resources();
            let routes = node.route_resources();
            let listeners = node.listener_resources();

            let version = compute_version(
                endpoints.iter().chain(&clusters).chain(&routes).chain(&listeners),
            );

            self.cache.set_snapshot(
                &node.id,
                Snapshot::new(version, endpoints, clusters, routes, listeners),
            );
        }

        Ok(count)
    }

    /// Poll continuously until cancelled. An in-flight tick always
    /// completes before the loop exits.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.poll_interval.as_secs(), "updater started");

        loop {
            match self.tick().await {
                Ok(nodes) => info!(nodes, "snapshots published"),
                Err(e) => warn!(error = %e, "updater tick failed, keeping previous snapshots"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("updater stopped");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
