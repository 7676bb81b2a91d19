//! Endpoint assignment construction.
//!
//! Turns provider endpoints into `ClusterLoadAssignment` resources. All
//! endpoints of a cluster land in a single locality; per-endpoint weights
//! come from the `endpoint.weight` annotation.

use envoy_types::pb::envoy::config::core::v3::{
    address, socket_address, Address, SocketAddress,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::google::protobuf::UInt32Value;

use crate::provider::EndpointSpec;

/// Build a TCP socket address.
pub fn socket_address(host: &str, port: u32) -> Address {
    Address {
        address: Some(address::Address::SocketAddress(SocketAddress {
            address: host.to_string(),
            port_specifier: Some(socket_address::PortSpecifier::PortValue(port)),
            ..Default::default()
        })),
    }
}

/// Build a weighted lb-endpoint from a provider endpoint.
pub fn make_lb_endpoint(spec: &EndpointSpec) -> LbEndpoint {
    let config = spec.config();

    LbEndpoint {
        host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(Endpoint {
            address: Some(socket_address(&spec.address, u32::from(spec.port))),
            ..Default::default()
        })),
        load_balancing_weight: Some(UInt32Value { value: config.weight }),
        ..Default::default()
    }
}

/// Build an empty assignment for a cluster, ready for lb-endpoints to be
/// appended into its single locality.
pub fn make_cluster_load_assignment(cluster_name: &str) -> ClusterLoadAssignment {
    ClusterLoadAssignment {
        cluster_name: cluster_name.to_string(),
        endpoints: vec![LocalityLbEndpoints { lb_endpoints: Vec::new(), ..Default::default() }],
        ..Default::default()
    }
}

/// Append provider endpoints to an assignment's locality.
pub fn append_endpoints(assignment: &mut ClusterLoadAssignment, endpoints: &[EndpointSpec]) {
    let locality = &mut assignment.endpoints[0];
    locality.lb_endpoints.extend(endpoints.iter().map(make_lb_endpoint));
}
