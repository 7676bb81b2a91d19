//! Shared resource plumbing: type URLs, `Any` packing, and snapshot version
//! hashing.

use envoy_types::pb::google::protobuf::Any;
use md5::{Digest, Md5};
use prost::Message;

/// Type URL served by EDS
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
/// Type URL served by CDS
pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
/// Type URL served by RDS
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
/// Type URL served by LDS
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

/// All type URLs a snapshot carries, in EDS/CDS/RDS/LDS order.
pub const ALL_TYPE_URLS: [&str; 4] =
    [ENDPOINT_TYPE_URL, CLUSTER_TYPE_URL, ROUTE_TYPE_URL, LISTENER_TYPE_URL];

/// A named Envoy resource packed as a protobuf `Any`, ready for a discovery
/// response.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltResource {
    pub name: String,
    pub body: Any,
}

impl BuiltResource {
    pub fn new(name: impl Into<String>, body: Any) -> Self {
        Self { name: name.into(), body }
    }
}

/// Pack a prost message into an `Any` with the given type URL.
pub fn any_from_message<M: Message>(type_url: &str, message: &M) -> Any {
    Any { type_url: type_url.to_string(), value: message.encode_to_vec() }
}

/// Compute the snapshot version over the serialized bytes of all resources.
///
/// The digest is MD5, hex-encoded. Callers must pass resources in a stable
/// order (the node assembler sorts by resource name) so that re-serializing
/// unchanged configuration yields an identical version.
pub fn compute_version<'a>(resources: impl IntoIterator<Item = &'a BuiltResource>) -> String {
    let mut hasher = Md5::new();
    for resource in resources {
        hasher.update(&resource.body.value);
    }
    hex::encode(hasher.finalize())
}
