//! Listener construction.
//!
//! A two-phase builder: construction fixes the bind address, target route
//! and traffic direction and seeds the HTTP connection manager with its
//! base filter chain (`[router]`); the inject methods then prepend optional
//! filters. Prepend order matters: the last-injected filter is the first
//! one traffic passes through, and the router is always the innermost
//! filter.

use envoy_types::pb::envoy::config::accesslog::v3::{access_log, AccessLog};
use envoy_types::pb::envoy::config::core::v3::{
    substitution_format_string, Http1ProtocolOptions, SubstitutionFormatString, TrafficDirection,
};
use envoy_types::pb::envoy::config::listener::v3::{filter, Filter, FilterChain, Listener};
use envoy_types::pb::envoy::extensions::access_loggers::file::v3::{
    file_access_log, FileAccessLog,
};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier, Tracing},
    http_filter, HttpConnectionManager, HttpFilter, Rds,
};
use envoy_types::pb::google::protobuf::{BoolValue, Struct, Value};

use crate::provider::{ClusterConfig, FaultConfig};
use crate::xds::cluster::xds_config_source;
use crate::xds::endpoint::socket_address;
use crate::xds::filters::http::{
    fault, health_check::HealthCheckFilterConfig, AuthzConfig, EXT_AUTHZ_FILTER_NAME,
    FAULT_FILTER_NAME, HEALTH_CHECK_FILTER_NAME, ROUTER_FILTER_NAME,
};
use crate::xds::resources::any_from_message;

const HCM_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const ROUTER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
const HCM_FILTER_NAME: &str = "envoy.filters.network.http_connection_manager";
const FILE_ACCESS_LOG_NAME: &str = "envoy.access_loggers.file";

const ACCESS_LOG_PATH: &str = "/tmp/access.log";

/// Which way traffic flows through a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ingress,
    Egress,
}

impl Direction {
    fn traffic_direction(self) -> i32 {
        match self {
            Direction::Ingress => TrafficDirection::Inbound as i32,
            Direction::Egress => TrafficDirection::Outbound as i32,
        }
    }
}

/// Construction-time listener parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSpec {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub direction: Direction,
    pub target_route: String,
}

/// Two-phase listener builder wrapping an HTTP connection manager.
#[derive(Debug, Clone)]
pub struct ListenerBuilder {
    spec: ListenerSpec,
    hcm: HttpConnectionManager,
}

impl ListenerBuilder {
    /// Fix the listener parameters and seed the base connection manager.
    pub fn new(spec: ListenerSpec) -> Self {
        let hcm = base_connection_manager(&spec);
        Self { spec, hcm }
    }

    /// Prepend the fault injection filter. No-op unless the config is
    /// enabled and carries at least one active sub-action.
    pub fn inject_fault(&mut self, config: &FaultConfig) {
        if !fault::has_active_fault(config) {
            return;
        }
        self.prepend_filter(HttpFilter {
            name: FAULT_FILTER_NAME.to_string(),
            config_type: Some(http_filter::ConfigType::TypedConfig(fault::to_any(config))),
            ..Default::default()
        });
    }

    /// Prepend the external authorization filter.
    pub fn inject_authz(&mut self, config: &AuthzConfig) {
        self.prepend_filter(HttpFilter {
            name: EXT_AUTHZ_FILTER_NAME.to_string(),
            config_type: Some(http_filter::ConfigType::TypedConfig(config.to_any())),
            ..Default::default()
        });
    }

    /// Prepend a pass-through health check cache for a cluster's probe path.
    pub fn inject_health_check_cache(&mut self, config: &ClusterConfig) {
        let filter_config = HealthCheckFilterConfig::from_cluster_config(config);
        self.prepend_filter(HttpFilter {
            name: HEALTH_CHECK_FILTER_NAME.to_string(),
            config_type: Some(http_filter::ConfigType::TypedConfig(filter_config.to_any())),
            ..Default::default()
        });
    }

    fn prepend_filter(&mut self, filter: HttpFilter) {
        self.hcm.http_filters.insert(0, filter);
    }

    /// The current HTTP filter names, outermost first.
    pub fn http_filter_names(&self) -> Vec<&str> {
        self.hcm.http_filters.iter().map(|f| f.name.as_str()).collect()
    }

    /// Finalise: serialize the connection manager into the listener's single
    /// filter chain. Pure projection; repeated calls yield equal listeners.
    pub fn build(&self) -> Listener {
        Listener {
            name: self.spec.name.clone(),
            address: Some(socket_address(&self.spec.address, self.spec.port)),
            traffic_direction: self.spec.direction.traffic_direction(),
            filter_chains: vec![FilterChain {
                filters: vec![Filter {
                    name: HCM_FILTER_NAME.to_string(),
                    config_type: Some(filter::ConfigType::TypedConfig(any_from_message(
                        HCM_TYPE_URL,
                        &self.hcm,
                    ))),
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

fn base_connection_manager(spec: &ListenerSpec) -> HttpConnectionManager {
    HttpConnectionManager {
        codec_type: CodecType::Auto as i32,
        stat_prefix: format!("{}_http", spec.target_route),
        // allow absolute urls to enable egress via HTTP_PROXY
        http_protocol_options: Some(Http1ProtocolOptions {
            allow_absolute_url: Some(BoolValue { value: true }),
            ..Default::default()
        }),
        access_log: vec![json_file_access_log()],
        tracing: Some(Tracing::default()),
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            route_config_name: spec.target_route.clone(),
            config_source: Some(xds_config_source()),
        })),
        http_filters: vec![HttpFilter {
            name: ROUTER_FILTER_NAME.to_string(),
            config_type: Some(http_filter::ConfigType::TypedConfig(any_from_message(
                ROUTER_TYPE_URL,
                &Router::default(),
            ))),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn json_file_access_log() -> AccessLog {
    let file_log = FileAccessLog {
        path: ACCESS_LOG_PATH.to_string(),
        access_log_format: Some(file_access_log::AccessLogFormat::LogFormat(
            SubstitutionFormatString {
                format: Some(substitution_format_string::Format::JsonFormat(json_log_fields())),
                ..Default::default()
            },
        )),
    };

    AccessLog {
        name: FILE_ACCESS_LOG_NAME.to_string(),
        config_type: Some(access_log::ConfigType::TypedConfig(any_from_message(
            "type.googleapis.com/envoy.extensions.access_loggers.file.v3.FileAccessLog",
            &file_log,
        ))),
        ..Default::default()
    }
}

fn json_log_fields() -> Struct {
    let fields = [
        ("start_time", "%START_TIME%"),
        ("method", "%REQ(:METHOD)%"),
        ("path", "%REQ(X-ENVOY-ORIGINAL-PATH?:PATH)%"),
        ("protocol", "%PROTOCOL%"),
        ("response_code", "%RESPONSE_CODE%"),
        ("response_flags", "%RESPONSE_FLAGS%"),
        ("bytes_received", "%BYTES_RECEIVED%"),
        ("bytes_sent", "%BYTES_SENT%"),
        ("duration", "%DURATION%"),
        ("upstream_service_time", "%RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)%"),
        ("x_forwarded_for", "%REQ(X-FORWARDED-FOR)%"),
        ("user_agent", "%REQ(USER-AGENT)%"),
        ("request_id", "%REQ(X-REQUEST-ID)%"),
        ("authority", "%REQ(:AUTHORITY)%"),
        ("upstream_host", "%UPSTREAM_HOST%"),
        ("upstream_cluster", "%UPSTREAM_CLUSTER%"),
        ("upstream_local_address", "%UPSTREAM_LOCAL_ADDRESS%"),
        ("downstream_local_address", "%DOWNSTREAM_LOCAL_ADDRESS%"),
        ("downstream_remote_address", "%DOWNSTREAM_REMOTE_ADDRESS%"),
        ("requested_server_name", "%REQUESTED_SERVER_NAME%"),
    ];

    Struct {
        fields: fields
            .iter()
            .map(|(key, value)| {
                (
                    key.to_string(),
                    Value {
                        kind: Some(envoy_types::pb::google::protobuf::value::Kind::StringValue(
                            value.to_string(),
                        )),
                    },
                )
            })
            .collect(),
    }
}
