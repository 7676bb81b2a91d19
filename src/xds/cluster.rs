//! Cluster construction.
//!
//! Every mesh cluster is an EDS cluster: endpoints are delivered separately
//! through this control plane, announced by an `eds_config` that points the
//! proxy back at the `xds` bootstrap cluster.

use std::time::Duration;

use envoy_types::pb::envoy::config::cluster::v3::{
    circuit_breakers::Thresholds,
    cluster::{ClusterDiscoveryType, DiscoveryType, DnsLookupFamily, EdsClusterConfig, LbPolicy},
    CircuitBreakers, Cluster,
};
use envoy_types::pb::envoy::config::core::v3::{
    api_config_source::ApiType, config_source::ConfigSourceSpecifier, grpc_service,
    health_check::{HealthChecker, HttpHealthCheck},
    ApiConfigSource, ApiVersion, ConfigSource, GrpcService, HealthCheck, RoutingPriority,
};
use envoy_types::pb::envoy::r#type::v3::Int64Range;
use envoy_types::pb::google::protobuf::UInt32Value;

use crate::provider::ClusterConfig;

/// Name of the bootstrap cluster through which proxies reach this control
/// plane. Every generated cluster and RDS reference resolves against it.
pub const XDS_CLUSTER_NAME: &str = "xds";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const HEALTHY_THRESHOLD: u32 = 3;
const UNHEALTHY_THRESHOLD: u32 = 3;

/// Build the config source pointing a resource subscription back at this
/// control plane's gRPC endpoint.
pub fn xds_config_source() -> ConfigSource {
    ConfigSource {
        resource_api_version: ApiVersion::V3 as i32,
        config_source_specifier: Some(ConfigSourceSpecifier::ApiConfigSource(ApiConfigSource {
            api_type: ApiType::Grpc as i32,
            transport_api_version: ApiVersion::V3 as i32,
            grpc_services: vec![GrpcService {
                target_specifier: Some(grpc_service::TargetSpecifier::EnvoyGrpc(
                    grpc_service::EnvoyGrpc {
                        cluster_name: XDS_CLUSTER_NAME.to_string(),
                        ..Default::default()
                    },
                )),
                ..Default::default()
            }],
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Build an EDS cluster from its typed annotation configuration.
pub fn make_cluster(name: &str, config: &ClusterConfig) -> Cluster {
    let hc = &config.health_check;
    let cb = &config.circuit_breaker;

    // 0 means "probe the endpoint port"; the proto expresses that by
    // leaving alt_port unset.
    let alt_port = (hc.port > 0).then(|| UInt32Value { value: hc.port });

    Cluster {
        name: name.to_string(),
        connect_timeout: Some(duration_proto(CONNECT_TIMEOUT)),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        dns_lookup_family: DnsLookupFamily::V4Only as i32,
        lb_policy: LbPolicy::RoundRobin as i32,
        circuit_breakers: Some(CircuitBreakers {
            thresholds: vec![Thresholds {
                priority: RoutingPriority::Default as i32,
                max_connections: Some(UInt32Value { value: cb.max_connections }),
                max_pending_requests: Some(UInt32Value { value: cb.max_pending_requests }),
                max_requests: Some(UInt32Value { value: cb.max_requests }),
                max_retries: Some(UInt32Value { value: cb.max_retries }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        health_checks: vec![HealthCheck {
            timeout: Some(duration_proto(hc.timeout)),
            interval: Some(duration_proto(hc.interval)),
            unhealthy_threshold: Some(UInt32Value { value: UNHEALTHY_THRESHOLD }),
            healthy_threshold: Some(UInt32Value { value: HEALTHY_THRESHOLD }),
            alt_port,
            health_checker: Some(HealthChecker::HttpHealthCheck(HttpHealthCheck {
                path: hc.path.clone(),
                expected_statuses: vec![Int64Range {
                    start: hc.expected_status_lower,
                    end: hc.expected_status_upper,
                }],
                ..Default::default()
            })),
            ..Default::default()
        }],
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(xds_config_source()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn duration_proto(duration: Duration) -> envoy_types::pb::google::protobuf::Duration {
    envoy_types::pb::google::protobuf::Duration {
        seconds: duration.as_secs() as i64,
        nanos: duration.subsec_nanos() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::annotations::{
        parse_cluster_annotations, ANNOTATION_CB_MAX_RETRIES, ANNOTATION_HEALTH_INTERVAL,
        ANNOTATION_HEALTH_PORT,
    };
    use std::collections::BTreeMap;

    fn config_from(entries: &[(&str, &str)]) -> ClusterConfig {
        let map: BTreeMap<String, String> =
            entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        parse_cluster_annotations(&map)
    }

    #[test]
    fn test_cluster_shape() {
        let cluster = make_cluster("alpha.svc", &ClusterConfig::default());

        assert_eq!(cluster.name, "alpha.svc");
        assert_eq!(
            cluster.cluster_discovery_type,
            Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32))
        );
        assert_eq!(cluster.dns_lookup_family, DnsLookupFamily::V4Only as i32);
        assert_eq!(cluster.lb_policy, LbPolicy::RoundRobin as i32);
        assert_eq!(cluster.connect_timeout.as_ref().unwrap().seconds, 1);
        assert!(cluster.eds_cluster_config.is_some());
    }

    #[test]
    fn test_default_health_check() {
        let cluster = make_cluster("alpha.svc", &ClusterConfig::default());
        let check = &cluster.health_checks[0];

        assert_eq!(check.timeout.as_ref().unwrap().seconds, 3);
        assert_eq!(check.interval.as_ref().unwrap().seconds, 10);
        assert!(check.alt_port.is_none());

        let http = match check.health_checker.as_ref().unwrap() {
            HealthChecker::HttpHealthCheck(http) => http,
            other => panic!("unexpected checker: {:?}", other),
        };
        assert_eq!(http.path, "/healthz");
        assert_eq!(http.expected_statuses[0].start, 200);
        assert_eq!(http.expected_statuses[0].end, 400);
    }

    #[test]
    fn test_annotated_health_check_and_breaker() {
        let config = config_from(&[
            (ANNOTATION_HEALTH_INTERVAL, "60000"),
            (ANNOTATION_HEALTH_PORT, "9901"),
            (ANNOTATION_CB_MAX_RETRIES, "9"),
        ]);
        let cluster = make_cluster("alpha.svc", &config);

        let check = &cluster.health_checks[0];
        assert_eq!(check.interval.as_ref().unwrap().seconds, 60);
        assert_eq!(check.alt_port.as_ref().unwrap().value, 9901);

        let thresholds = &cluster.circuit_breakers.as_ref().unwrap().thresholds[0];
        assert_eq!(thresholds.priority, RoutingPriority::Default as i32);
        assert_eq!(thresholds.max_retries.as_ref().unwrap().value, 9);
        assert_eq!(thresholds.max_connections.as_ref().unwrap().value, 1_000);
    }

    #[test]
    fn test_eds_points_back_at_control_plane() {
        let source = xds_config_source();
        let api = match source.config_source_specifier.as_ref().unwrap() {
            ConfigSourceSpecifier::ApiConfigSource(api) => api,
            other => panic!("unexpected specifier: {:?}", other),
        };
        assert_eq!(api.api_type, ApiType::Grpc as i32);
        let target = api.grpc_services[0].target_specifier.as_ref().unwrap();
        match target {
            grpc_service::TargetSpecifier::EnvoyGrpc(grpc) => {
                assert_eq!(grpc.cluster_name, XDS_CLUSTER_NAME);
            }
            other => panic!("unexpected target: {:?}", other),
        }
    }
}
