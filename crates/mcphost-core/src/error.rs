//! Configuration errors

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading or validating an `mcpServers` settings document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not structurally valid JSON for the settings model.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document parsed but failed validation.
    #[error("invalid settings: {0}")]
    Invalid(#[source] Box<ConfigError>),

    #[error("server '{server}': unsupported transport type '{transport}'")]
    UnsupportedTransport { server: String, transport: String },

    #[error("server '{server}': command is required for stdio transport")]
    MissingCommand { server: String },

    #[error("server '{server}': URL is required for {transport} transport")]
    MissingUrl {
        server: String,
        transport: &'static str,
    },

    #[error("server '{server}': timeout must be at least {minimum:?}, got {actual:?}")]
    TimeoutTooShort {
        server: String,
        minimum: Duration,
        actual: Duration,
    },
}

impl ConfigError {
    /// Wrap a validation failure the way loaders report it.
    pub fn invalid(inner: ConfigError) -> Self {
        ConfigError::Invalid(Box::new(inner))
    }
}
