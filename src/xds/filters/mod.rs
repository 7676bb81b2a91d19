//! Typed builders for the Envoy HTTP filters the mesh composes into its
//! listeners.
//!
//! Filter modules follow a consistent pattern: a high-level configuration
//! struct derived from annotations, and a `to_any()` method producing the
//! Envoy protobuf `Any` payload plus the well-known filter name.

pub mod http;

pub use http::{AuthzConfig, HealthCheckFilterConfig};
