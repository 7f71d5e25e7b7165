//! Hub and pool errors

use std::time::Duration;

use mcphost_core::ConfigError;

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unsupported transport type: {0}")]
    UnsupportedTransport(String),

    #[error("failed to connect to server '{server}': {message}")]
    Connect { server: String, message: String },

    /// Startup of one server failed; every connection opened before it has been closed.
    #[error("failed to initialize server(s): {server}: {source}")]
    InitializeServers {
        server: String,
        #[source]
        source: Box<HubError>,
    },

    #[error("tool does not exist: {0}")]
    ToolNotFound(String),

    #[error("failed to serialize parameters: {0}")]
    SerializeParameters(String),

    #[error("failed to serialize tool input schema: {0}")]
    SerializeSchema(#[source] serde_json::Error),

    #[error("invalid tool input schema: {0}")]
    InvalidSchema(String),

    #[error("no connection found for server: {0}")]
    ServerNotFound(String),

    #[error("server is disabled: {0}")]
    ServerDisabled(String),

    #[error("tool call '{tool}' failed: {message}")]
    ToolCall { tool: String, message: String },

    #[error("{operation} on server '{server}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        server: String,
        timeout: Duration,
    },

    #[error("server '{0}' is closed")]
    Closed(String),

    #[error("failed to close servers: {}", .0.join("; "))]
    Close(Vec<String>),
}

impl HubError {
    pub(crate) fn connect(server: &str, message: impl Into<String>) -> Self {
        HubError::Connect {
            server: server.to_string(),
            message: message.into(),
        }
    }
}
