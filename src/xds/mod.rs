//! Envoy xDS (eXtended Discovery Service) implementation
//!
//! Provides the gRPC server implementing Envoy's discovery protocols:
//! - ADS (Aggregated Discovery Service)
//! - EDS (Endpoint Discovery Service)
//! - CDS (Cluster Discovery Service)
//! - RDS (Route Discovery Service)
//! - LDS (Listener Discovery Service)

pub mod cache;
pub mod cluster;
pub mod endpoint;
pub mod filters;
pub mod listener;
pub mod resources;
pub mod route;
pub mod services;

use std::future::Future;
use std::sync::Arc;

use tonic::transport::Server;
use tracing::info;

use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryServiceServer;
use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryServiceServer;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryServiceServer;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryServiceServer;

use crate::{config::XdsConfig, Result};
pub use cache::{Snapshot, SnapshotCache, WatchRequest, WatchResponse};
pub use services::{
    AggregatedDiscoveryServiceImpl, ClusterDiscoveryServiceImpl, EndpointDiscoveryServiceImpl,
    ListenerDiscoveryServiceImpl, RouteDiscoveryServiceImpl,
};

/// Start the xDS gRPC server over a shared snapshot cache, with graceful
/// shutdown.
pub async fn start_xds_server<F>(
    config: &XdsConfig,
    cache: Arc<SnapshotCache>,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config
        .socket_address()
        .parse()
        .map_err(|e| crate::Error::config(format!("Invalid xDS address: {}", e)))?;

    info!(address = %addr, "Starting Envoy xDS server");

    let server = Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(AggregatedDiscoveryServiceImpl::new(
            cache.clone(),
        )))
        .add_service(EndpointDiscoveryServiceServer::new(EndpointDiscoveryServiceImpl::new(
            cache.clone(),
        )))
        .add_service(ClusterDiscoveryServiceServer::new(ClusterDiscoveryServiceImpl::new(
            cache.clone(),
        )))
        .add_service(RouteDiscoveryServiceServer::new(RouteDiscoveryServiceImpl::new(
            cache.clone(),
        )))
        .add_service(ListenerDiscoveryServiceServer::new(ListenerDiscoveryServiceImpl::new(
            cache,
        )))
        .serve_with_shutdown(addr, shutdown_signal);

    server.await.map_err(|e| {
        let error_msg = e.to_string();
        if error_msg.contains("Address already in use") || error_msg.contains("bind") {
            crate::Error::transport(format!(
                "xDS server failed to bind to {}: port {} is already in use",
                addr,
                addr.port()
            ))
        } else {
            crate::Error::transport(format!("xDS server failed: {}", e))
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::XdsConfig;

    #[test]
    fn test_xds_config_default_address() {
        let config = XdsConfig::default();
        assert_eq!(config.socket_address(), "0.0.0.0:50000");
    }

    #[tokio::test]
    async fn test_invalid_bind_address_is_a_config_error() {
        let config = XdsConfig { bind_address: "not an address".to_string(), port: 50000 };
        let cache = Arc::new(SnapshotCache::new());
        let err = start_xds_server(&config, cache, async {}).await.unwrap_err();
        assert!(matches!(err, crate::Error::Config { .. }));
    }
}
