//! Transport abstraction for MCP connections
//!
//! Each resolved [`TransportKind`] maps to one [`Transport`] implementation. Building a
//! transport performs no I/O; [`Transport::connect`] spawns or dials the server and runs
//! the MCP handshake.

mod http;
mod sse;
mod stdio;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mcphost_core::{ServerConfig, TransportKind};
use tracing::{error, info};

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

use crate::client::{McpClient, McpClientHandler, RmcpToolClient, ToolClient};
use crate::error::{HubError, Result};

/// Transport trait for MCP connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and complete the MCP handshake
    async fn connect(&self) -> Result<McpClient>;

    fn kind(&self) -> TransportKind;

    /// Short description for logging
    fn description(&self) -> String;
}

/// Build the transport for a validated server entry.
pub fn create_transport(server_name: &str, config: &ServerConfig) -> Result<Box<dyn Transport>> {
    let timeout = config.timeout_duration();
    let transport: Box<dyn Transport> = match config.effective_transport() {
        TransportKind::Stdio => Box::new(StdioTransport::new(
            server_name,
            config.command.clone(),
            config.args.clone(),
            build_environment(config.env.as_ref()),
            timeout,
        )),
        TransportKind::Sse => Box::new(SseTransport::new(server_name, &config.url, timeout)),
        kind @ (TransportKind::Http | TransportKind::Streamable) => {
            Box::new(HttpTransport::new(server_name, &config.url, kind, timeout))
        }
        other => return Err(HubError::UnsupportedTransport(other.to_string())),
    };
    Ok(transport)
}

/// Build, connect and wrap a client for one server.
pub async fn create_client(server_name: &str, config: &ServerConfig) -> Result<Arc<dyn ToolClient>> {
    let transport = create_transport(server_name, config)?;
    info!(
        server = %server_name,
        transport = %transport.description(),
        "Connecting to MCP server"
    );

    let service = transport.connect().await.map_err(|e| {
        error!(server = %server_name, error = %e, "Failed to connect to MCP server");
        e
    })?;

    info!(server = %server_name, "MCP server connected");
    Ok(Arc::new(RmcpToolClient::new(
        server_name,
        config.timeout_duration(),
        service,
    )))
}

/// `KEY=VALUE` entries added on top of the inherited environment.
///
/// `None` stays `None`; an empty map yields an empty list.
pub fn build_environment(env: Option<&HashMap<String, String>>) -> Option<Vec<String>> {
    env.map(|vars| {
        let mut entries: Vec<String> = vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
        entries.sort();
        entries
    })
}

fn create_client_handler(server_name: &str) -> McpClientHandler {
    McpClientHandler::new(server_name)
}

/// Await a handshake future under the server timeout.
async fn serve_with_timeout<F, E>(
    server_name: &str,
    timeout: std::time::Duration,
    handshake: F,
) -> Result<McpClient>
where
    F: std::future::Future<Output = std::result::Result<McpClient, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, handshake).await {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(e)) => Err(HubError::connect(server_name, format!("MCP handshake failed: {e}"))),
        Err(_) => Err(HubError::Timeout {
            operation: "connect",
            server: server_name.to_string(),
            timeout,
        }),
    }
}
