//! # Inventory Providers
//!
//! A provider is the source of truth for the mesh: it enumerates which
//! services exist, which endpoints back them, and on which nodes they run.
//! The core only depends on the [`ServiceProvider`] contract; concrete
//! backends (a YAML file, a cloud scheduler) are pluggable.

pub mod annotations;
pub mod file;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use annotations::{
    ClusterConfig, CircuitBreakerConfig, EndpointConfig, FaultConfig, HealthCheckConfig,
    RetryConfig,
};
pub use file::FileProvider;

/// An address/port combination backing a cluster.
///
/// Identity within a cluster is `(address, port)`. Endpoint annotations are
/// merged over the owning cluster's annotations when the typed configuration
/// is derived, so an endpoint can override per-service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl EndpointSpec {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self { address: address.into(), port, annotations: BTreeMap::new() }
    }
}

/// A named group of endpoints serving the same application.
///
/// Cluster names are unique per node; equal names on different nodes refer
/// to the same logical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

impl ClusterSpec {
    pub fn new(name: impl Into<String>, endpoints: Vec<EndpointSpec>) -> Self {
        Self { name: name.into(), annotations: BTreeMap::new(), endpoints }
    }

    /// Derive the typed configuration from the cluster's annotations merged
    /// with those of all its endpoints (endpoint entries win on collision).
    pub fn config(&self) -> ClusterConfig {
        annotations::parse_cluster_annotations(&self.merged_annotations())
    }

    /// Merge cluster and endpoint annotations into one map. Endpoint entries
    /// overwrite cluster entries on key collision.
    pub fn merged_annotations(&self) -> BTreeMap<String, String> {
        let mut merged = self.annotations.clone();
        for endpoint in &self.endpoints {
            for (key, value) in &endpoint.annotations {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// The inventory keyed by node id: the union of all ingress clusters each
/// node exposes.
pub type NodeInventory = HashMap<String, Vec<ClusterSpec>>;

/// Abstract source of truth for the mesh inventory.
///
/// Errors are transient by contract: the updater logs them and retries on
/// the next poll tick.
#[async_trait]
pub trait ServiceProvider: std::fmt::Debug + Send + Sync {
    /// Return all clusters the provider is aware of, grouped by node id.
    async fn get_clusters(&self) -> Result<NodeInventory>;
}

/// Provider selection, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    /// AWS Fargate task discovery (requires the `aws` feature)
    Fargate,
    /// YAML file, re-read on every poll
    File,
}

/// Construct the configured provider implementation.
pub fn create_provider(
    kind: ProviderKind,
    config_path: Option<&str>,
) -> Result<Box<dyn ServiceProvider>> {
    match kind {
        ProviderKind::File => {
            let path = config_path.ok_or_else(|| {
                crate::Error::config("the file provider requires --config <path>")
            })?;
            Ok(Box::new(FileProvider::new(path)))
        }
        ProviderKind::Fargate => Err(crate::Error::config(
            "the fargate provider is not compiled in; rebuild with --features aws",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_annotations_endpoint_wins() {
        let mut cluster = ClusterSpec::new(
            "alpha.svc",
            vec![EndpointSpec::new("10.0.0.1", 8080), EndpointSpec::new("10.0.0.2", 8080)],
        );
        cluster.annotations.insert("healthcheck.path".into(), "/ping".into());
        cluster.endpoints[1].annotations.insert("healthcheck.path".into(), "/live".into());

        let merged = cluster.merged_annotations();
        assert_eq!(merged.get("healthcheck.path").map(String::as_str), Some("/live"));
    }

    #[test]
    fn test_create_provider_requires_config_path() {
        let err = create_provider(ProviderKind::File, None).unwrap_err();
        assert!(matches!(err, crate::Error::Config { .. }));
    }

    #[test]
    fn test_fargate_provider_requires_feature() {
        let err = create_provider(ProviderKind::Fargate, None).unwrap_err();
        assert!(err.to_string().contains("aws"));
    }
}
