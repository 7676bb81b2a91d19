//! # Annotation Vocabulary
//!
//! Clusters and endpoints carry an untyped `string -> string` annotation
//! map. This module projects that map onto typed configuration with a single
//! parse step. The vocabulary is a closed set: unknown keys are ignored,
//! malformed values are logged and replaced by their defaults, and a parse
//! failure never fails the surrounding reconciliation.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;

use super::EndpointSpec;

/// Enables retry behavior on the service's route
pub const ANNOTATION_ENABLE_RETRY: &str = "enable-retry";
/// Number of retry attempts on the service's route
pub const ANNOTATION_NUM_RETRIES: &str = "num-retries";

/// HTTP path probed by the cluster health check
pub const ANNOTATION_HEALTH_PATH: &str = "healthcheck.path";
/// Health check interval in milliseconds
pub const ANNOTATION_HEALTH_INTERVAL: &str = "healthcheck.interval";
/// Health check timeout in milliseconds
pub const ANNOTATION_HEALTH_TIMEOUT: &str = "healthcheck.timeout";
/// Health check response cache duration in milliseconds
pub const ANNOTATION_HEALTH_CACHE: &str = "healthcheck.cache";
/// Alternative TCP port for the health check; 0 means the endpoint port
pub const ANNOTATION_HEALTH_PORT: &str = "healthcheck.port";
/// Accepted status codes as a `lower-upper` range
pub const ANNOTATION_HEALTH_EXPECTED_STATUS: &str = "healthcheck.expected-status";

/// Maximum upstream connections
pub const ANNOTATION_CB_MAX_CONNECTIONS: &str = "circuit-breaker.max-connections";
/// Maximum pending upstream requests
pub const ANNOTATION_CB_MAX_PENDING: &str = "circuit-breaker.max-pending";
/// Maximum parallel upstream requests
pub const ANNOTATION_CB_MAX_REQUESTS: &str = "circuit-breaker.max-requests";
/// Maximum parallel upstream retries
pub const ANNOTATION_CB_MAX_RETRIES: &str = "circuit-breaker.max-retries";

/// Presence enables fault injection on the service's ingress traffic
pub const ANNOTATION_FAULT_INJECT: &str = "fault.inject";
/// Percentage of requests to delay, 0-100
pub const ANNOTATION_FAULT_DELAY_PERCENT: &str = "fault.delay.percent";
/// Injected delay in milliseconds
pub const ANNOTATION_FAULT_DELAY_DURATION: &str = "fault.delay.duration";
/// Percentage of requests to abort, 0-100
pub const ANNOTATION_FAULT_ABORT_PERCENT: &str = "fault.abort.percent";
/// HTTP status code of aborted requests
pub const ANNOTATION_FAULT_ABORT_CODE: &str = "fault.abort.code";

/// Load-balancing weight of a single endpoint, 1-128
pub const ANNOTATION_ENDPOINT_WEIGHT: &str = "endpoint.weight";

const DEFAULT_HEALTH_PATH: &str = "/healthz";
const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_HEALTH_INTERVAL_MS: u64 = 10_000;
const DEFAULT_HEALTH_CACHE_MS: u64 = 30_000;
const DEFAULT_EXPECTED_STATUS_LOWER: i64 = 200;
const DEFAULT_EXPECTED_STATUS_UPPER: i64 = 400;

const DEFAULT_CB_MAX_CONNECTIONS: u32 = 1_000;
const DEFAULT_CB_MAX_PENDING: u32 = 1_000;
const DEFAULT_CB_MAX_REQUESTS: u32 = 1_000;
const DEFAULT_CB_MAX_RETRIES: u32 = 3;

const DEFAULT_FAULT_ABORT_CODE: u32 = 503;
const DEFAULT_FAULT_DELAY_MS: u64 = 30;

const DEFAULT_NUM_RETRIES: u32 = 3;

const DEFAULT_ENDPOINT_WEIGHT: u32 = 64;
const MAX_ENDPOINT_WEIGHT: u32 = 128;

/// Typed projection of a cluster's merged annotations
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterConfig {
    pub health_check: HealthCheckConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Fault configuration applies to the INGRESS traffic of the service
    pub fault: FaultConfig,
    pub retry: RetryConfig,
}

/// Health-checking behavior of a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub path: String,
    pub timeout: Duration,
    pub interval: Duration,
    pub cache_duration: Duration,
    /// 0 means the endpoint port is used
    pub port: u32,
    pub expected_status_lower: i64,
    pub expected_status_upper: i64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_HEALTH_PATH.to_string(),
            timeout: Duration::from_millis(DEFAULT_HEALTH_TIMEOUT_MS),
            interval: Duration::from_millis(DEFAULT_HEALTH_INTERVAL_MS),
            cache_duration: Duration::from_millis(DEFAULT_HEALTH_CACHE_MS),
            port: 0,
            expected_status_lower: DEFAULT_EXPECTED_STATUS_LOWER,
            expected_status_upper: DEFAULT_EXPECTED_STATUS_UPPER,
        }
    }
}

/// Circuit-breaker thresholds of a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub max_connections: u32,
    pub max_pending_requests: u32,
    pub max_requests: u32,
    pub max_retries: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_CB_MAX_CONNECTIONS,
            max_pending_requests: DEFAULT_CB_MAX_PENDING,
            max_requests: DEFAULT_CB_MAX_REQUESTS,
            max_retries: DEFAULT_CB_MAX_RETRIES,
        }
    }
}

/// Fault-injection behavior of a listener's HTTP filter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultConfig {
    pub enabled: bool,
    pub delay_chance: u32,
    pub delay_duration: Duration,
    pub abort_chance: u32,
    pub abort_code: u32,
}

/// Retry behavior applied at the virtual-host level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub enabled: bool,
    pub num_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { enabled: false, num_retries: DEFAULT_NUM_RETRIES }
    }
}

/// Behavior of a single endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub weight: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { weight: DEFAULT_ENDPOINT_WEIGHT }
    }
}

impl EndpointSpec {
    /// Derive the typed endpoint configuration. The weight must satisfy
    /// `0 < weight <= 128`; anything else falls back to the default.
    pub fn config(&self) -> EndpointConfig {
        let weight =
            parse_u32_annotation(&self.annotations, ANNOTATION_ENDPOINT_WEIGHT)
                .unwrap_or(DEFAULT_ENDPOINT_WEIGHT);
        if weight == 0 || weight > MAX_ENDPOINT_WEIGHT {
            warn!(
                endpoint = %self.address,
                weight,
                "endpoint has out-of-range weight, using default"
            );
            return EndpointConfig { weight: DEFAULT_ENDPOINT_WEIGHT };
        }
        EndpointConfig { weight }
    }
}

/// Evaluate the merged annotation map into a [`ClusterConfig`], pre-filling
/// defaults for every missing or malformed value.
pub fn parse_cluster_annotations(annotations: &BTreeMap<String, String>) -> ClusterConfig {
    let mut cc = ClusterConfig::default();

    if let Some(path) = annotations.get(ANNOTATION_HEALTH_PATH) {
        cc.health_check.path = path.clone();
    }
    if let Some(ms) = parse_u64_annotation(annotations, ANNOTATION_HEALTH_TIMEOUT) {
        cc.health_check.timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_u64_annotation(annotations, ANNOTATION_HEALTH_INTERVAL) {
        cc.health_check.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = parse_u64_annotation(annotations, ANNOTATION_HEALTH_CACHE) {
        cc.health_check.cache_duration = Duration::from_millis(ms);
    }
    if let Some(port) = parse_u32_annotation(annotations, ANNOTATION_HEALTH_PORT) {
        cc.health_check.port = port;
    }
    if let Some(raw) = annotations.get(ANNOTATION_HEALTH_EXPECTED_STATUS) {
        match parse_status_range(raw) {
            Some((lower, upper)) => {
                cc.health_check.expected_status_lower = lower;
                cc.health_check.expected_status_upper = upper;
            }
            None => warn!(
                value = %raw,
                key = ANNOTATION_HEALTH_EXPECTED_STATUS,
                "malformed status range annotation, using default"
            ),
        }
    }

    if let Some(num) = parse_u32_annotation(annotations, ANNOTATION_CB_MAX_CONNECTIONS) {
        cc.circuit_breaker.max_connections = num;
    }
    if let Some(num) = parse_u32_annotation(annotations, ANNOTATION_CB_MAX_PENDING) {
        cc.circuit_breaker.max_pending_requests = num;
    }
    if let Some(num) = parse_u32_annotation(annotations, ANNOTATION_CB_MAX_REQUESTS) {
        cc.circuit_breaker.max_requests = num;
    }
    if let Some(num) = parse_u32_annotation(annotations, ANNOTATION_CB_MAX_RETRIES) {
        cc.circuit_breaker.max_retries = num;
    }

    // Boolean annotation: presence enables, value is ignored.
    if annotations.contains_key(ANNOTATION_FAULT_INJECT) {
        cc.fault.enabled = true;
        cc.fault.abort_code = DEFAULT_FAULT_ABORT_CODE;
        cc.fault.delay_duration = Duration::from_millis(DEFAULT_FAULT_DELAY_MS);
    }
    if let Some(num) = parse_u32_annotation(annotations, ANNOTATION_FAULT_DELAY_PERCENT) {
        cc.fault.delay_chance = num;
    }
    if let Some(ms) = parse_u64_annotation(annotations, ANNOTATION_FAULT_DELAY_DURATION) {
        cc.fault.delay_duration = Duration::from_millis(ms);
    }
    if let Some(num) = parse_u32_annotation(annotations, ANNOTATION_FAULT_ABORT_PERCENT) {
        cc.fault.abort_chance = num;
    }
    if let Some(code) = parse_u32_annotation(annotations, ANNOTATION_FAULT_ABORT_CODE) {
        cc.fault.abort_code = code;
    }

    if annotations.contains_key(ANNOTATION_ENABLE_RETRY) {
        cc.retry.enabled = true;
    }
    if let Some(num) = parse_u32_annotation(annotations, ANNOTATION_NUM_RETRIES) {
        cc.retry.num_retries = num;
    }

    cc
}

/// Look up `key` and parse it as a positive integer. Returns `None` for a
/// missing key, an unparseable value, or a value <= 0, logging the latter
/// two so the fallback is visible.
fn parse_i64_annotation(annotations: &BTreeMap<String, String>, key: &str) -> Option<i64> {
    let raw = annotations.get(key)?;
    match raw.trim().parse::<i64>() {
        Ok(num) if num > 0 => Some(num),
        Ok(num) => {
            warn!(value = num, key, "non-positive annotation value, using default");
            None
        }
        Err(_) => {
            warn!(value = %raw, key, "unparseable annotation value, using default");
            None
        }
    }
}

fn parse_u64_annotation(annotations: &BTreeMap<String, String>, key: &str) -> Option<u64> {
    parse_i64_annotation(annotations, key).map(|num| num as u64)
}

fn parse_u32_annotation(annotations: &BTreeMap<String, String>, key: &str) -> Option<u32> {
    parse_i64_annotation(annotations, key).and_then(|num| u32::try_from(num).ok())
}

/// Parse a `lower-upper` status range.
fn parse_status_range(raw: &str) -> Option<(i64, i64)> {
    let (lower, upper) = raw.split_once('-')?;
    let lower = lower.trim().parse::<i64>().ok()?;
    let upper = upper.trim().parse::<i64>().ok()?;
    Some((lower, upper))
}
