//! # Configuration Settings
//!
//! Defines the configuration structure for the Trellis control plane.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::errors::{Result, TrellisError};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// xDS server configuration
    #[validate(nested)]
    pub xds: XdsConfig,

    /// Mesh traffic port layout
    #[validate(nested)]
    pub mesh: MeshConfig,

    /// Updater poll loop configuration
    #[validate(nested)]
    pub updater: UpdaterConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(TrellisError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if self.mesh.ingress_port == self.mesh.egress_port {
            return Err(TrellisError::validation(
                "Mesh ingress and egress ports cannot be the same",
            ));
        }

        if u32::from(self.xds.port) == self.mesh.ingress_port
            || u32::from(self.xds.port) == self.mesh.egress_port
        {
            return Err(TrellisError::validation("xDS port cannot collide with a mesh port"));
        }

        Ok(())
    }
}

/// xDS gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct XdsConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Bind address cannot be empty"))]
    pub bind_address: String,

    /// Server port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 50000 }
    }
}

impl XdsConfig {
    /// Get the server bind address
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Well-known ports of the sidecar mesh. Every proxy exposes the node's
/// services on the ingress port and forwards outbound traffic through the
/// egress port.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MeshConfig {
    /// Port on which every sidecar accepts mesh-internal traffic
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub ingress_port: u32,

    /// Port on which every sidecar accepts outbound traffic from its
    /// co-located application
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub egress_port: u32,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self { ingress_port: 4100, egress_port: 4000 }
    }
}

/// Updater poll loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdaterConfig {
    /// Seconds between provider polls
    #[validate(range(min = 1, max = 3600, message = "Poll interval must be 1-3600 seconds"))]
    pub poll_interval_secs: u64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 10 }
    }
}

impl UpdaterConfig {
    /// Get the poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.xds.socket_address(), "0.0.0.0:50000");
        assert_eq!(config.mesh.ingress_port, 4100);
        assert_eq!(config.mesh.egress_port, 4000);
        assert_eq!(config.updater.poll_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_port_collision_rejected() {
        let mut config = AppConfig::default();
        config.mesh.egress_port = config.mesh.ingress_port;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.xds.port = 4100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_poll_interval_rejected() {
        let mut config = AppConfig::default();
        config.updater.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
