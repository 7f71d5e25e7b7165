//! # McpHost Core Library
//!
//! Settings model and validation rules for McpHost.
//!
//! ## Modules
//!
//! - `config` - `mcpServers` settings document, transport auto-detection, validation
//! - `error` - configuration error taxonomy

pub mod config;
pub mod error;

pub use config::{
    expand_env_vars, load_settings, load_settings_from_str, validate_server_config,
    validate_settings, McpSettings, ServerConfig, TransportKind, DEFAULT_MCP_TIMEOUT,
    MIN_MCP_TIMEOUT, SSE_PATH_SUFFIX,
};
pub use error::ConfigError;
