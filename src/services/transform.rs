//! The reconciliation algorithm.
//!
//! Turns the provider's per-node ingress view into each node's complete
//! mesh view: local clusters serving the node's own services on their
//! native ports, global egress clusters reaching every instance of every
//! service through the mesh ingress port, and the pair of listeners wiring
//! both up. A synthetic gateway node fronts the mesh with an authorizing
//! ingress listener.

use tracing::debug;

use crate::config::MeshConfig;
use crate::errors::Result;
use crate::provider::{ClusterSpec, EndpointSpec, NodeInventory};
use crate::xds::filters::AuthzConfig;
use crate::xds::listener::{Direction, ListenerBuilder, ListenerSpec};
use crate::xds::route::{make_virtual_host, VirtualHostSpec};

use super::node_assembler::MeshNode;

/// Prefix of clusters serving a node's own ingress traffic
pub const LOCAL_CLUSTER_PREFIX: &str = "local";
/// Route configuration consulted by every egress listener
pub const EGRESS_ROUTE: &str = "egress_route";
/// Route configuration consulted by every ingress listener
pub const INGRESS_ROUTE: &str = "ingress_route";
/// Node id of the synthesized mesh gateway
pub const INGRESS_NODE_ID: &str = "ingress";
/// Well-known cluster carrying external authorization traffic
pub const AUTHZ_CLUSTER_NAME: &str = "authz";

const INGRESS_LISTENER_NAME: &str = "default-ingress";
const EGRESS_LISTENER_NAME: &str = "default-egress";

const AUTHZ_ADDRESS: &str = "authfoo";
const AUTHZ_PORT: u16 = 3000;

/// Rewrite a cluster's endpoints to the mesh ingress port, producing the
/// egress view other nodes use to reach it.
fn make_egress_cluster(cluster: &ClusterSpec, ingress_port: u32) -> ClusterSpec {
    ClusterSpec {
        name: cluster.name.clone(),
        annotations: cluster.annotations.clone(),
        endpoints: cluster
            .endpoints
            .iter()
            .map(|ep| EndpointSpec {
                address: ep.address.clone(),
                port: ingress_port as u16,
                annotations: ep.annotations.clone(),
            })
            .collect(),
    }
}

fn local_cluster_name(name: &str) -> String {
    format!("{}_{}", LOCAL_CLUSTER_PREFIX, name)
}

fn ingress_listener_spec(port: u32) -> ListenerSpec {
    ListenerSpec {
        name: INGRESS_LISTENER_NAME.to_string(),
        address: "0.0.0.0".to_string(),
        port,
        direction: Direction::Ingress,
        target_route: INGRESS_ROUTE.to_string(),
    }
}

fn egress_listener_spec(port: u32) -> ListenerSpec {
    ListenerSpec {
        name: EGRESS_LISTENER_NAME.to_string(),
        address: "0.0.0.0".to_string(),
        port,
        direction: Direction::Egress,
        target_route: EGRESS_ROUTE.to_string(),
    }
}

/// The well-known authz cluster referenced by the gateway's authorization
/// filter. It never appears in the inventory, so it is injected here.
fn authz_cluster_spec() -> ClusterSpec {
    ClusterSpec::new(AUTHZ_CLUSTER_NAME, vec![EndpointSpec::new(AUTHZ_ADDRESS, AUTHZ_PORT)])
}

/// Reconcile the inventory into the complete per-node mesh configuration.
///
/// Node ids are processed in sorted order so that repeated runs over an
/// unchanged inventory serialize identically and hash to the same snapshot
/// version.
pub fn transform(inventory: &NodeInventory, mesh: &MeshConfig) -> Result<Vec<MeshNode>> {
    let mut node_ids: Vec<&String> = inventory.keys().collect();
    node_ids.sort();

    // Global cluster set, computed once: the egress copy of every cluster
    // on every node, plus one vhost per service name.
    let mut global_clusters: Vec<ClusterSpec> = Vec::new();
    let mut global_vhost_specs: Vec<VirtualHostSpec> = Vec::new();
    for node_id in &node_ids {
        for cluster in &inventory[*node_id] {
            global_clusters.push(make_egress_cluster(cluster, mesh.ingress_port));
            global_vhost_specs.push(
                VirtualHostSpec::new(&cluster.name, &cluster.name)
                    .with_retry(cluster.config().retry),
            );
        }
    }

    let mut nodes = Vec::with_capacity(node_ids.len() + 1);

    for node_id in &node_ids {
        let clusters = &inventory[*node_id];
        let mut node = MeshNode::new(node_id.as_str());

        node.add_clusters(&global_clusters);
        node.add_virtual_hosts(
            EGRESS_ROUTE,
            global_vhost_specs.iter().map(|s| make_virtual_host(s, mesh.ingress_port)).collect(),
        );

        let mut ingress_listener = ListenerBuilder::new(ingress_listener_spec(mesh.ingress_port));
        let egress_listener = ListenerBuilder::new(egress_listener_spec(mesh.egress_port));

        for cluster in clusters {
            let config = cluster.config();
            let local_name = local_cluster_name(&cluster.name);

            node.add_clusters(&[ClusterSpec {
                name: local_name.clone(),
                annotations: cluster.annotations.clone(),
                endpoints: cluster.endpoints.clone(),
            }]);
            node.add_virtual_hosts(
                INGRESS_ROUTE,
                vec![make_virtual_host(
                    &VirtualHostSpec::new(&cluster.name, &local_name)
                        .with_retry(config.retry.clone()),
                    mesh.ingress_port,
                )],
            );

            ingress_listener.inject_health_check_cache(&config);
            ingress_listener.inject_fault(&config.fault);
        }

        node.add_listeners(vec![ingress_listener.build(), egress_listener.build()]);

        debug!(node_id = %node.id, clusters = node.cluster_count(), "reconciled node");
        nodes.push(node);
    }

    // The gateway node: all global clusters behind an authorizing ingress
    // listener.
    let mut gateway = MeshNode::new(INGRESS_NODE_ID);
    gateway.add_clusters(&global_clusters);
    gateway.add_clusters(&[authz_cluster_spec()]);
    gateway.add_virtual_hosts(
        INGRESS_ROUTE,
        global_vhost_specs.iter().map(|s| make_virtual_host(s, mesh.ingress_port)).collect(),
    );

    let mut gateway_listener = ListenerBuilder::new(ingress_listener_spec(mesh.ingress_port));
    gateway_listener.inject_authz(&AuthzConfig::new(AUTHZ_CLUSTER_NAME));
    gateway.add_listeners(vec![gateway_listener.build()]);
    nodes.push(gateway);

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
    use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
    use prost::Message;
    use std::collections::HashMap;

    fn mesh() -> MeshConfig {
        MeshConfig::default()
    }

    fn cluster(name: &str, endpoints: &[(&str, u16)]) -> ClusterSpec {
        ClusterSpec::new(
            name,
            endpoints.iter().map(|(a, p)| EndpointSpec::new(*a, *p)).collect(),
        )
    }

    fn inventory(entries: Vec<(&str, Vec<ClusterSpec>)>) -> NodeInventory {
        entries.into_iter().map(|(id, clusters)| (id.to_string(), clusters)).collect()
    }

    fn node_by_id<'a>(nodes: &'a [MeshNode], id: &str) -> &'a MeshNode {
        nodes.iter().find(|n| n.id == id).unwrap()
    }

    fn assignment_of(node: &MeshNode, cluster_name: &str) -> ClusterLoadAssignment {
        let built = node
            .endpoint_resources()
            .into_iter()
            .find(|r| r.name == cluster_name)
            .unwrap_or_else(|| panic!("no endpoint assignment for {}", cluster_name));
        ClusterLoadAssignment::decode(built.body.value.as_slice()).unwrap()
    }

    fn endpoint_pairs(assignment: &ClusterLoadAssignment) -> Vec<(String, u32)> {
        use envoy_types::pb::envoy::config::core::v3::{address, socket_address};
        use envoy_types::pb::envoy::config::endpoint::v3::lb_endpoint;

        assignment.endpoints[0]
            .lb_endpoints
            .iter()
            .map(|lb| {
                let endpoint = match lb.host_identifier.as_ref().unwrap() {
                    lb_endpoint::HostIdentifier::Endpoint(ep) => ep,
                    other => panic!("unexpected host identifier: {:?}", other),
                };
                match endpoint.address.as_ref().unwrap().address.as_ref().unwrap() {
                    address::Address::SocketAddress(socket) => {
                        let port = match socket.port_specifier.as_ref().unwrap() {
                            socket_address::PortSpecifier::PortValue(p) => *p,
                            other => panic!("unexpected port: {:?}", other),
                        };
                        (socket.address.clone(), port)
                    }
                    other => panic!("unexpected address: {:?}", other),
                }
            })
            .collect()
    }

    #[test]
    fn test_single_node_single_service() {
        let nodes = transform(
            &inventory(vec![("n1", vec![cluster("a.svc", &[("1.1.1.1", 1312)])])]),
            &mesh(),
        )
        .unwrap();

        // the input node plus the synthesized gateway
        assert_eq!(nodes.len(), 2);

        let n1 = node_by_id(&nodes, "n1");
        assert!(n1.has_cluster("a.svc"));
        assert!(n1.has_cluster("local_a.svc"));

        let egress = assignment_of(n1, "a.svc");
        assert_eq!(endpoint_pairs(&egress), vec![("1.1.1.1".to_string(), 4100)]);

        let local = assignment_of(n1, "local_a.svc");
        assert_eq!(endpoint_pairs(&local), vec![("1.1.1.1".to_string(), 1312)]);
    }

    #[test]
    fn test_cross_node_union() {
        let nodes = transform(
            &inventory(vec![
                ("n1", vec![cluster("a.svc", &[("1.1.1.1", 1312)])]),
                ("n2", vec![cluster("a.svc", &[("1.1.1.2", 1312)])]),
            ]),
            &mesh(),
        )
        .unwrap();

        for id in ["n1", "n2"] {
            let node = node_by_id(&nodes, id);
            let global = assignment_of(node, "a.svc");
            assert_eq!(
                endpoint_pairs(&global),
                vec![("1.1.1.1".to_string(), 4100), ("1.1.1.2".to_string(), 4100)]
            );
        }
    }

    #[test]
    fn test_route_referential_integrity() {
        let nodes = transform(
            &inventory(vec![
                ("n1", vec![cluster("a.svc", &[("1.1.1.1", 1312)])]),
                ("n2", vec![cluster("b.svc", &[("1.1.1.2", 80)])]),
            ]),
            &mesh(),
        )
        .unwrap();

        for node in &nodes {
            for built in node.route_resources() {
                let route = RouteConfiguration::decode(built.body.value.as_slice()).unwrap();
                for vhost in &route.virtual_hosts {
                    for r in &vhost.routes {
                        let target = crate::xds::route::route_action_cluster(r).unwrap();
                        assert!(
                            node.has_cluster(target),
                            "node {} references missing cluster {}",
                            node.id,
                            target
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_vhost_names_unique_within_routes() {
        let nodes = transform(
            &inventory(vec![
                ("n1", vec![cluster("a.svc", &[("1.1.1.1", 1312)])]),
                ("n2", vec![cluster("a.svc", &[("1.1.1.2", 1312)])]),
            ]),
            &mesh(),
        )
        .unwrap();

        for node in &nodes {
            for built in node.route_resources() {
                let route = RouteConfiguration::decode(built.body.value.as_slice()).unwrap();
                let mut names: Vec<_> =
                    route.virtual_hosts.iter().map(|v| v.name.clone()).collect();
                let total = names.len();
                names.sort();
                names.dedup();
                assert_eq!(names.len(), total, "duplicate vhost in {}", built.name);
            }
        }
    }

    #[test]
    fn test_gateway_node() {
        let nodes =
            transform(&inventory(vec![("n1", vec![cluster("a.svc", &[("1.1.1.1", 1312)])])]), &mesh())
                .unwrap();

        let gateway = node_by_id(&nodes, INGRESS_NODE_ID);
        assert!(gateway.has_cluster("a.svc"));
        assert!(gateway.has_cluster(AUTHZ_CLUSTER_NAME));
        // authz endpoints resolve to the well-known authorization service
        let authz = assignment_of(gateway, AUTHZ_CLUSTER_NAME);
        assert_eq!(endpoint_pairs(&authz), vec![("authfoo".to_string(), 3000)]);

        // a single listener, on the ingress route
        assert_eq!(gateway.listener_resources().len(), 1);
        let routes: Vec<_> = gateway.route_resources().into_iter().map(|r| r.name).collect();
        assert_eq!(routes, vec![INGRESS_ROUTE.to_string()]);
    }

    #[test]
    fn test_listener_pair_per_node() {
        let nodes =
            transform(&inventory(vec![("n1", vec![cluster("a.svc", &[("1.1.1.1", 1312)])])]), &mesh())
                .unwrap();

        let n1 = node_by_id(&nodes, "n1");
        let names: Vec<_> = n1.listener_resources().into_iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![INGRESS_LISTENER_NAME.to_string(), EGRESS_LISTENER_NAME.to_string()]
        );
    }

    #[test]
    fn test_empty_inventory_yields_only_gateway() {
        let nodes = transform(&HashMap::new(), &mesh()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, INGRESS_NODE_ID);
    }
}
