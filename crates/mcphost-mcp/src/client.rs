//! Client boundary between the hub and a single MCP server
//!
//! The hub only ever talks to [`ToolClient`]. Real servers are reached through
//! [`RmcpToolClient`], which wraps a running `rmcp` client session; in-process clients
//! and test doubles implement the trait directly.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    JsonObject, LoggingLevel, LoggingMessageNotificationParam, Tool,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::{ClientHandler, RoleClient};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{HubError, Result};

/// Type alias for a connected MCP client session
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

/// A tool as advertised by a server, before schema normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: JsonObject,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: JsonObject) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema,
        }
    }
}

impl From<Tool> for ToolDefinition {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name.into_owned(),
            description: tool.description.map(|d| d.into_owned()),
            input_schema: (*tool.input_schema).clone(),
        }
    }
}

/// Capability set the hub needs from one server connection.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Every tool the server currently advertises.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Call `name` with an optional argument object and render the result as text.
    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> Result<String>;

    /// Shut the connection down. Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}

/// Client handler that forwards server notifications into tracing
#[derive(Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
    server_name: String,
}

impl std::fmt::Debug for McpClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientHandler")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl McpClientHandler {
    pub fn new(server_name: &str) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("mcphost-{}", server_name),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("McpHost".to_string()),
                    ..Default::default()
                },
                meta: None,
            },
            server_name: server_name.to_string(),
        }
    }
}

impl ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server_name = self.server_name.clone();
        async move {
            // The hub's registry is a startup snapshot; a reload means a new hub.
            info!(
                server = %server_name,
                "Server sent tools/list_changed; registry keeps its startup snapshot"
            );
        }
    }

    fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let server_name = self.server_name.clone();
        async move {
            let message = match &params.data {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let logger = params.logger.as_deref().unwrap_or("-");

            match params.level {
                LoggingLevel::Debug => {
                    debug!(server = %server_name, logger, "Server log: {}", message)
                }
                LoggingLevel::Info | LoggingLevel::Notice => {
                    info!(server = %server_name, logger, "Server log: {}", message)
                }
                LoggingLevel::Warning => {
                    warn!(server = %server_name, logger, "Server log: {}", message)
                }
                LoggingLevel::Error
                | LoggingLevel::Critical
                | LoggingLevel::Alert
                | LoggingLevel::Emergency => {
                    error!(server = %server_name, logger, "Server log: {}", message)
                }
            }
        }
    }
}

/// [`ToolClient`] over a running `rmcp` session.
pub struct RmcpToolClient {
    server_name: String,
    timeout: Duration,
    service: Mutex<Option<McpClient>>,
}

impl RmcpToolClient {
    pub fn new(server_name: impl Into<String>, timeout: Duration, service: McpClient) -> Self {
        Self {
            server_name: server_name.into(),
            timeout,
            service: Mutex::new(Some(service)),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn is_closed(&self) -> bool {
        self.service.lock().is_none()
    }

    fn peer(&self) -> Result<rmcp::Peer<RoleClient>> {
        self.service
            .lock()
            .as_ref()
            .map(|client| client.peer().clone())
            .ok_or_else(|| HubError::Closed(self.server_name.clone()))
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| HubError::Timeout {
                operation,
                server: self.server_name.clone(),
                timeout: self.timeout,
            })
    }
}

#[async_trait]
impl ToolClient for RmcpToolClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let peer = self.peer()?;
        let tools = self
            .with_timeout("list tools", peer.list_all_tools())
            .await?
            .map_err(|e| HubError::connect(&self.server_name, format!("failed to list tools: {e}")))?;

        debug!(
            server = %self.server_name,
            tool_count = tools.len(),
            "Retrieved tools from server"
        );
        Ok(tools.into_iter().map(ToolDefinition::from).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> Result<String> {
        let peer = self.peer()?;
        let params = CallToolRequestParams {
            name: name.to_string().into(),
            arguments,
            task: None,
            meta: None,
        };

        let result = self
            .with_timeout("tool call", peer.call_tool(params))
            .await?
            .map_err(|e| HubError::ToolCall {
                tool: name.to_string(),
                message: e.to_string(),
            })?;

        let text = render_call_result(&result);
        if result.is_error.unwrap_or(false) {
            return Err(HubError::ToolCall {
                tool: name.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    async fn close(&self) -> Result<()> {
        let service = self.service.lock().take();
        let Some(service) = service else {
            return Ok(());
        };

        info!(server = %self.server_name, "Closing MCP client");
        service
            .cancel()
            .await
            .map(|_| ())
            .map_err(|e| HubError::connect(&self.server_name, format!("failed to cancel service: {e}")))
    }
}

/// Flatten a tool result into the string handed back to callers.
///
/// Text parts are joined with newlines. Without any text, structured content wins, and
/// the raw content list is the last resort.
pub fn render_call_result(result: &CallToolResult) -> String {
    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|c| c.as_text().map(|t| t.text.as_str()))
        .collect();
    if !texts.is_empty() {
        return texts.join("\n");
    }
    if let Some(structured) = &result.structured_content {
        return structured.to_string();
    }
    if result.content.is_empty() {
        return String::new();
    }
    serde_json::to_string(&result.content).unwrap_or_default()
}
