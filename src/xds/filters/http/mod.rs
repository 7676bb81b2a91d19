//! HTTP filter configuration builders.

pub mod ext_authz;
pub mod fault;
pub mod health_check;

pub use ext_authz::AuthzConfig;
pub use health_check::HealthCheckFilterConfig;

/// Well-known name of the fault injection filter
pub const FAULT_FILTER_NAME: &str = "envoy.filters.http.fault";
/// Well-known name of the external authorization filter
pub const EXT_AUTHZ_FILTER_NAME: &str = "envoy.filters.http.ext_authz";
/// Well-known name of the health check filter
pub const HEALTH_CHECK_FILTER_NAME: &str = "envoy.filters.http.health_check";
/// Well-known name of the router filter; always the last filter in a chain
pub const ROUTER_FILTER_NAME: &str = "envoy.filters.http.router";
