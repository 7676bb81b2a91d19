//! External authorization (ext_authz) HTTP filter configuration.
//!
//! The gateway's ingress listener delegates authorization to an external
//! HTTP service before any request enters the mesh.

use envoy_types::pb::envoy::config::core::v3::{http_uri, HttpUri};
use envoy_types::pb::envoy::extensions::filters::http::ext_authz::v3::{
    ext_authz::Services, ExtAuthz, HttpService,
};
use envoy_types::pb::google::protobuf::{Any, Duration};

use crate::xds::resources::any_from_message;

const EXT_AUTHZ_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.ext_authz.v3.ExtAuthz";

const AUTHZ_URI: &str = "http://authfoo:3000/authenticate";
const AUTHZ_TIMEOUT_NANOS: i32 = 125_000_000;

/// Behavior of the authz HTTP filter: which upstream cluster carries the
/// authorization requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    pub cluster: String,
}

impl AuthzConfig {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self { cluster: cluster.into() }
    }

    /// Build the ext_authz filter payload. failure_mode_allow is false: an
    /// unreachable authz service rejects traffic.
    pub fn to_any(&self) -> Any {
        let ext_authz = ExtAuthz {
            failure_mode_allow: false,
            services: Some(Services::HttpService(HttpService {
                server_uri: Some(HttpUri {
                    uri: AUTHZ_URI.to_string(),
                    timeout: Some(Duration { seconds: 0, nanos: AUTHZ_TIMEOUT_NANOS }),
                    http_upstream_type: Some(http_uri::HttpUpstreamType::Cluster(
                        self.cluster.clone(),
                    )),
                }),
                ..Default::default()
            })),
            ..Default::default()
        };

        any_from_message(EXT_AUTHZ_TYPE_URL, &ext_authz)
    }
}
