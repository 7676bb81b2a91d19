//! Per-node resource accumulation.
//!
//! A [`MeshNode`] collects the four coordinated resource collections of one
//! proxy while the transform walks the inventory. Clusters deduplicate by
//! name with endpoint accumulation, virtual hosts deduplicate per
//! `(route, vhost-name)`, listeners keep append order.

use std::collections::{BTreeMap, HashMap, HashSet};

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::{RouteConfiguration, VirtualHost};

use crate::provider::ClusterSpec;
use crate::xds::cluster::make_cluster;
use crate::xds::endpoint::{append_endpoints, make_cluster_load_assignment};
use crate::xds::resources::{
    any_from_message, BuiltResource, CLUSTER_TYPE_URL, ENDPOINT_TYPE_URL, LISTENER_TYPE_URL,
    ROUTE_TYPE_URL,
};

/// One proxy's view of the mesh, under construction.
#[derive(Debug, Default)]
pub struct MeshNode {
    pub id: String,
    clusters: BTreeMap<String, Cluster>,
    endpoints: BTreeMap<String, ClusterLoadAssignment>,
    routes: BTreeMap<String, RouteConfiguration>,
    seen_vhosts: HashMap<String, HashSet<String>>,
    listeners: Vec<Listener>,
}

impl MeshNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    /// Insert clusters, building the Envoy cluster on first sight of a name
    /// and accumulating endpoints on every call.
    pub fn add_clusters(&mut self, specs: &[ClusterSpec]) {
        for spec in specs {
            if !self.clusters.contains_key(&spec.name) {
                self.clusters.insert(spec.name.clone(), make_cluster(&spec.name, &spec.config()));
            }
            self.add_endpoints(&spec.name, &spec.endpoints);
        }
    }

    /// Append lb-endpoints to a cluster's assignment, creating it if needed.
    pub fn add_endpoints(&mut self, cluster_name: &str, endpoints: &[crate::provider::EndpointSpec]) {
        let assignment = self
            .endpoints
            .entry(cluster_name.to_string())
            .or_insert_with(|| make_cluster_load_assignment(cluster_name));
        append_endpoints(assignment, endpoints);
    }

    /// Append virtual hosts to a route configuration, creating it if needed.
    /// A vhost name already seen on the route is skipped, which makes the
    /// operation idempotent.
    pub fn add_virtual_hosts(&mut self, route_name: &str, vhosts: Vec<VirtualHost>) {
        let route = self
            .routes
            .entry(route_name.to_string())
            .or_insert_with(|| RouteConfiguration {
                name: route_name.to_string(),
                ..Default::default()
            });
        let seen = self.seen_vhosts.entry(route_name.to_string()).or_default();

        for vhost in vhosts {
            if seen.insert(vhost.name.clone()) {
                route.virtual_hosts.push(vhost);
            }
        }
    }

    /// Append listeners.
    pub fn add_listeners(&mut self, listeners: Vec<Listener>) {
        self.listeners.extend(listeners);
    }

    /// Whether a cluster with this name has been added.
    pub fn has_cluster(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    /// Number of distinct clusters added so far.
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Endpoint assignments in cluster-name order.
    pub fn endpoint_resources(&self) -> Vec<BuiltResource> {
        self.endpoints
            .iter()
            .map(|(name, ep)| BuiltResource::new(name, any_from_message(ENDPOINT_TYPE_URL, ep)))
            .collect()
    }

    /// Clusters in name order.
    pub fn cluster_resources(&self) -> Vec<BuiltResource> {
        self.clusters
            .iter()
            .map(|(name, c)| BuiltResource::new(name, any_from_message(CLUSTER_TYPE_URL, c)))
            .collect()
    }

    /// Route configurations in name order.
    pub fn route_resources(&self) -> Vec<BuiltResource> {
        self.routes
            .iter()
            .map(|(name, r)| BuiltResource::new(name, any_from_message(ROUTE_TYPE_URL, r)))
            .collect()
    }

    /// Listeners in append order.
    pub fn listener_resources(&self) -> Vec<BuiltResource> {
        self.listeners
            .iter()
            .map(|l| BuiltResource::new(&l.name, any_from_message(LISTENER_TYPE_URL, l)))
            .collect()
    }
}
