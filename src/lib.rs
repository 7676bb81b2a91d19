//! # Trellis
//!
//! Trellis is an annotation-driven Envoy control plane for sidecar meshes.
//! It turns a flat service inventory (clusters and endpoints decorated with
//! a small annotation vocabulary) into per-node proxy configuration and
//! serves it over the xDS streaming protocols.
//!
//! ## Architecture
//!
//! ```text
//! Provider → Updater → Transform → Snapshot cache → Discovery server → Proxy
//! ```
//!
//! ## Core Components
//!
//! - **Provider**: pluggable inventory source (`nodes → clusters → endpoints`)
//! - **Transform**: reconciles the inventory into per-node resource sets
//! - **Snapshot cache**: versioned, per-node store with subscriber watches
//! - **Discovery server**: tonic-based gRPC server for ADS/EDS/CDS/RDS/LDS

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod provider;
pub mod services;
pub mod startup;
pub mod xds;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{Error, Result, TrellisError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
