//! # Error Handling
//!
//! This module provides the error taxonomy for the Trellis control plane.
//! It defines custom error types using `thiserror` for all operations.

/// Custom result type for Trellis operations
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Main error type for the Trellis control plane
#[derive(thiserror::Error, Debug)]
pub enum TrellisError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Inventory provider errors; always transient, the updater retries on
    /// the next poll tick
    #[error("Provider error: {context}")]
    Provider {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Reconciliation failures while turning provider inventory into
    /// per-node resources
    #[error("Transform error: {message}")]
    Transform { message: String, node_id: Option<String> },

    /// xDS protocol errors
    #[error("xDS protocol error: {message}")]
    Xds { message: String, node_id: Option<String> },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_yaml::Error,
        context: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Network transport errors (gRPC)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Parsing/decoding errors
    #[error("Parse error: {context}")]
    Parse {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Alias used throughout the crate
pub type Error = TrellisError;

impl TrellisError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a provider error
    pub fn provider<S: Into<String>>(context: S) -> Self {
        Self::Provider { context: context.into(), source: None }
    }

    /// Create a provider error with source
    pub fn provider_with_source<S: Into<String>>(
        context: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Provider { context: context.into(), source: Some(source) }
    }

    /// Create a transform error
    pub fn transform<S: Into<String>>(message: S) -> Self {
        Self::Transform { message: message.into(), node_id: None }
    }

    /// Create a transform error scoped to a node
    pub fn transform_for_node<S: Into<String>, N: Into<String>>(message: S, node_id: N) -> Self {
        Self::Transform { message: message.into(), node_id: Some(node_id.into()) }
    }

    /// Create an xDS protocol error
    pub fn xds<S: Into<String>>(message: S) -> Self {
        Self::Xds { message: message.into(), node_id: None }
    }

    /// Create an xDS protocol error with node ID
    pub fn xds_with_node<S: Into<String>, N: Into<String>>(message: S, node_id: N) -> Self {
        Self::Xds { message: message.into(), node_id: Some(node_id.into()) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a parse error
    pub fn parse<S: Into<String>>(context: S) -> Self {
        Self::Parse { context: context.into(), source: None }
    }

    /// Create a parse error with source
    pub fn parse_with_source<S: Into<String>>(
        context: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Parse { context: context.into(), source: Some(source) }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Check if the error aborts only the current updater tick rather than
    /// the process
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TrellisError::Provider { .. } | TrellisError::Transform { .. } | TrellisError::Io { .. }
        )
    }
}

// Error conversions for common external error types
impl From<std::io::Error> for TrellisError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_yaml::Error> for TrellisError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization { source: error, context: "YAML deserialization failed".to_string() }
    }
}

impl From<config::ConfigError> for TrellisError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for TrellisError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

impl From<std::num::ParseIntError> for TrellisError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse_with_source("Integer parsing failed", Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = TrellisError::config("Test configuration error");
        assert!(matches!(error, TrellisError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_transform_error_with_node() {
        let error = TrellisError::transform_for_node("missing cluster correlation", "alpha.1");
        if let TrellisError::Transform { node_id, .. } = error {
            assert_eq!(node_id, Some("alpha.1".to_string()));
        } else {
            panic!("expected transform error");
        }
    }

    #[test]
    fn test_transient_errors() {
        assert!(TrellisError::provider("poll failed").is_transient());
        assert!(TrellisError::transform("bad data").is_transient());
        assert!(!TrellisError::config("bad flag").is_transient());
        assert!(!TrellisError::xds("bad nonce").is_transient());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let trellis_error: TrellisError = io_error.into();
        assert!(matches!(trellis_error, TrellisError::Io { .. }));

        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("a: [b").unwrap_err();
        let trellis_error: TrellisError = yaml_error.into();
        assert!(matches!(trellis_error, TrellisError::Serialization { .. }));
    }

    #[test]
    fn test_parse_error_conversion() {
        let int_error = "not_a_number".parse::<i64>().unwrap_err();
        let trellis_error: TrellisError = int_error.into();
        assert!(matches!(trellis_error, TrellisError::Parse { .. }));
    }
}
