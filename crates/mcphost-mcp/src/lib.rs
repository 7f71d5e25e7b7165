//! # McpHost MCP Library
//!
//! Connects to MCP servers over stdio, legacy SSE and streamable HTTP, collects their
//! tools into one registry, and shares connected hubs between callers.
//!
//! ## Modules
//!
//! - `client` - the [`ToolClient`] boundary and its `rmcp` implementation
//! - `transport` - per-transport connection setup
//! - `schema` - tool input schema normalization
//! - `hub` - [`McpHub`], the per-settings tool registry
//! - `pool` - [`ConnectionPool`], fingerprint-keyed sharing of hubs
//! - `collection` - [`ToolCollection`], a load-select-close helper

pub mod client;
pub mod collection;
pub mod error;
pub mod hub;
pub mod pool;
pub mod schema;
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{McpClient, McpClientHandler, RmcpToolClient, ToolClient, ToolDefinition};
pub use collection::ToolCollection;
pub use error::{HubError, Result};
pub use hub::{tool_key, Admission, HubStatus, HubTool, McpHub, McpHubBuilder, ToolInfo};
pub use pool::{
    connection_pool, generate_config_key, ConnectionPool, PoolConfig, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_SWEEP_INTERVAL, EMPTY_CONFIG_KEY,
};
pub use schema::{normalize_schema, ParameterSchema, PropertySchema};
pub use transport::{build_environment, create_client, create_transport, Transport};

pub use mcphost_core::{McpSettings, ServerConfig, TransportKind};
