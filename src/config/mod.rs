//! # Configuration Management
//!
//! Configuration is assembled from defaults, an optional file, and
//! environment variables, in that order (later sources win).

pub mod settings;

pub use settings::{AppConfig, MeshConfig, UpdaterConfig, XdsConfig};

use crate::errors::{Result, TrellisError};
use config::{Config, Environment, File};
use std::path::Path;

/// Load application configuration from multiple sources
///
/// Configuration is loaded in the following order (later sources override
/// earlier ones):
/// 1. Default values
/// 2. Configuration file (if specified)
/// 3. Environment variables with TRELLIS_ prefix
pub fn load_config<P: AsRef<Path>>(config_path: Option<P>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    builder = builder.add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        let path = path.as_ref();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(TrellisError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
    }

    builder = builder.add_source(Environment::with_prefix("TRELLIS").separator("_").try_parsing(true));

    let config = builder.build().map_err(|e| {
        TrellisError::config_with_source("Failed to build configuration", Box::new(e))
    })?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        TrellisError::config_with_source("Failed to deserialize configuration", Box::new(e))
    })?;

    app_config.validate()?;

    Ok(app_config)
}

/// Load configuration from defaults and environment variables only
pub fn load_config_from_env() -> Result<AppConfig> {
    load_config::<&str>(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_default_config() {
        let config = load_config_from_env().unwrap();
        assert_eq!(config.xds.port, 50000);
        assert_eq!(config.mesh.ingress_port, 4100);
    }

    #[test]
    fn test_load_config_from_file() {
        let yaml_content = r#"
xds:
  bind_address: "127.0.0.1"
  port: 18000
updater:
  poll_interval_secs: 3
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = load_config(Some(temp_file.path())).unwrap();
        assert_eq!(config.xds.bind_address, "127.0.0.1");
        assert_eq!(config.xds.port, 18000);
        assert_eq!(config.updater.poll_interval_secs, 3);
        // untouched sections keep their defaults
        assert_eq!(config.mesh.egress_port, 4000);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = load_config(Some("/definitely/not/here.yaml"));
        assert!(result.is_err());
    }
}
