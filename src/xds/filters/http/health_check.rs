//! Health check HTTP filter configuration.
//!
//! Pass-through health check cache: the sidecar answers health probes for
//! its local service from cache for the configured duration instead of
//! hitting the application on every probe.

use std::time::Duration;

use envoy_types::pb::envoy::config::route::v3::{header_matcher, HeaderMatcher};
use envoy_types::pb::envoy::extensions::filters::http::health_check::v3::HealthCheck as HealthCheckProto;
use envoy_types::pb::envoy::r#type::matcher::v3::{string_matcher, StringMatcher};
use envoy_types::pb::google::protobuf::{Any, BoolValue, Duration as ProtoDuration};

use crate::provider::ClusterConfig;
use crate::xds::resources::any_from_message;

const HEALTH_CHECK_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.health_check.v3.HealthCheck";

/// Configuration of the health check cache filter: which path to intercept
/// and how long responses stay cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckFilterConfig {
    pub path: String,
    pub cache_time: Duration,
}

impl HealthCheckFilterConfig {
    /// Derive the filter configuration from a cluster's health check config.
    pub fn from_cluster_config(config: &ClusterConfig) -> Self {
        Self {
            path: config.health_check.path.clone(),
            cache_time: config.health_check.cache_duration,
        }
    }

    /// Build the health check filter payload.
    pub fn to_any(&self) -> Any {
        let proto = HealthCheckProto {
            pass_through_mode: Some(BoolValue { value: true }),
            cache_time: Some(ProtoDuration {
                seconds: self.cache_time.as_secs() as i64,
                nanos: self.cache_time.subsec_nanos() as i32,
            }),
            headers: vec![HeaderMatcher {
                name: ":path".to_string(),
                header_match_specifier: Some(header_matcher::HeaderMatchSpecifier::StringMatch(
                    StringMatcher {
                        match_pattern: Some(string_matcher::MatchPattern::Exact(self.path.clone())),
                        ignore_case: false,
                    },
                )),
                ..Default::default()
            }],
            ..Default::default()
        };

        any_from_message(HEALTH_CHECK_TYPE_URL, &proto)
    }
}
