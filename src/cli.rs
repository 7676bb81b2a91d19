//! # Command Line Interface
//!
//! Process-level flags. Application settings (ports, poll interval) come
//! from `TRELLIS_*` environment variables; `--config` names the inventory
//! file consumed by the file provider.

use clap::Parser;

use crate::provider::ProviderKind;

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Annotation-driven Envoy control plane for sidecar meshes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Inventory provider backend
    #[arg(long, value_enum, default_value = "fargate")]
    pub provider: ProviderKind,

    /// Path to the inventory file (file provider only)
    #[arg(long)]
    pub config: Option<String>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["trellis"]);
        assert_eq!(cli.provider, ProviderKind::Fargate);
        assert!(cli.config.is_none());
        assert_eq!(cli.log_level, "info");
        assert!(!cli.log_json);
    }

    #[test]
    fn test_file_provider_with_config() {
        let cli =
            Cli::parse_from(["trellis", "--provider", "file", "--config", "/etc/mesh.yaml"]);
        assert_eq!(cli.provider, ProviderKind::File);
        assert_eq!(cli.config.as_deref(), Some("/etc/mesh.yaml"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(Cli::try_parse_from(["trellis", "--provider", "consul"]).is_err());
    }
}
