//! Tool hub
//!
//! An [`McpHub`] owns one connection per enabled server of a settings document and
//! exposes every admitted tool in a single flat registry keyed `"<server>_<tool>"`.
//!
//! Startup is all-or-nothing: if any enabled server fails to connect or list its tools,
//! the connections opened so far are closed and no hub is returned.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use mcphost_core::{load_settings, load_settings_from_str, validate_settings, McpSettings, ServerConfig};
use parking_lot::RwLock;
use rmcp::model::JsonObject;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{ToolClient, ToolDefinition};
use crate::error::{HubError, Result};
use crate::schema::{normalize_schema, ParameterSchema};
use crate::transport::create_client;

/// Lifecycle of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubStatus {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Which filter admitted a tool into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The server has no allow-list
    AllowAll,
    /// The tool is named on the server's allow-list
    AllowListed,
}

/// Registry key for `tool` on `server`.
pub fn tool_key(server: &str, tool: &str) -> String {
    format!("{server}_{tool}")
}

/// Caller-facing description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Tool name as advertised by its server
    pub name: String,
    /// Registry key
    pub key: String,
    pub server_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: ParameterSchema,
}

/// A registered tool bound to the client of its server.
#[derive(Clone)]
pub struct HubTool {
    key: String,
    server_name: String,
    tool_name: String,
    description: Option<String>,
    schema: ParameterSchema,
    admission: Admission,
    client: Arc<dyn ToolClient>,
}

impl std::fmt::Debug for HubTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubTool")
            .field("key", &self.key)
            .field("server_name", &self.server_name)
            .field("tool_name", &self.tool_name)
            .field("admission", &self.admission)
            .finish()
    }
}

impl HubTool {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.tool_name.clone(),
            key: self.key.clone(),
            server_name: self.server_name.clone(),
            description: self.description.clone(),
            parameters: self.schema.clone(),
        }
    }

    /// Call the tool with already-encoded JSON arguments.
    pub async fn invoke_json(&self, arguments: &str) -> Result<String> {
        let value: Value = if arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| HubError::SerializeParameters(e.to_string()))?
        };
        self.invoke(&value).await
    }

    /// Call the tool with any serializable argument object.
    pub async fn invoke<P: Serialize + ?Sized>(&self, params: &P) -> Result<String> {
        let arguments = encode_arguments(params)?;
        debug!(tool = %self.key, server = %self.server_name, "Invoking tool");
        self.client.call_tool(&self.tool_name, arguments).await
    }
}

/// Turn caller parameters into an MCP argument object.
///
/// `null` means no arguments; anything other than an object is rejected.
fn encode_arguments<P: Serialize + ?Sized>(params: &P) -> Result<Option<JsonObject>> {
    match serde_json::to_value(params) {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Object(object)) => Ok(Some(object)),
        Ok(other) => Err(HubError::SerializeParameters(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(HubError::SerializeParameters(e.to_string())),
    }
}

struct Connection {
    config: ServerConfig,
    client: Arc<dyn ToolClient>,
    tool_keys: Vec<String>,
}

struct HubState {
    status: HubStatus,
    connections: BTreeMap<String, Connection>,
    tools: BTreeMap<String, HubTool>,
}

/// Connections to a set of MCP servers and the flat registry of their tools.
pub struct McpHub {
    settings: McpSettings,
    state: RwLock<HubState>,
}

impl std::fmt::Debug for McpHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("McpHub")
            .field("status", &state.status)
            .field("servers", &state.connections.keys().collect::<Vec<_>>())
            .field("tools", &state.tools.len())
            .finish()
    }
}

impl McpHub {
    pub fn builder() -> McpHubBuilder {
        McpHubBuilder::default()
    }

    /// Validate `settings` and connect every enabled server.
    pub async fn from_settings(settings: McpSettings) -> Result<Self> {
        Self::builder().settings(settings).build().await
    }

    /// Load a settings file and connect every enabled server.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = load_settings(path)?;
        Self::from_settings(settings).await
    }

    /// Parse a settings document and connect every enabled server.
    pub async fn from_json_str(text: &str) -> Result<Self> {
        let settings = load_settings_from_str(text)?;
        Self::from_settings(settings).await
    }

    pub fn settings(&self) -> &McpSettings {
        &self.settings
    }

    pub fn status(&self) -> HubStatus {
        self.state.read().status
    }

    /// Names of the servers with a live connection.
    pub fn server_names(&self) -> Vec<String> {
        self.state.read().connections.keys().cloned().collect()
    }

    /// Tools by registry key; an empty slice selects every tool.
    pub fn get_tools<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<HubTool>> {
        let state = self.state.read();
        if names.is_empty() {
            return Ok(state.tools.values().cloned().collect());
        }
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                state
                    .tools
                    .get(name)
                    .cloned()
                    .ok_or_else(|| HubError::ToolNotFound(name.to_string()))
            })
            .collect()
    }

    pub fn get_tool(&self, name: &str) -> Result<HubTool> {
        self.state
            .read()
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| HubError::ToolNotFound(name.to_string()))
    }

    /// Registry key to caller-facing tool description.
    pub fn tools_map(&self) -> BTreeMap<String, ToolInfo> {
        self.state
            .read()
            .tools
            .iter()
            .map(|(key, tool)| (key.clone(), tool.info()))
            .collect()
    }

    /// Invoke a tool by registry key.
    pub async fn invoke_tool<P: Serialize + ?Sized>(&self, name: &str, params: &P) -> Result<String> {
        let tool = self.get_tool(name)?;
        tool.invoke(params).await
    }

    /// Client for `server`.
    pub fn get_client(&self, server: &str) -> Result<Arc<dyn ToolClient>> {
        if let Some(connection) = self.state.read().connections.get(server) {
            if connection.config.disabled {
                return Err(HubError::ServerDisabled(server.to_string()));
            }
            return Ok(Arc::clone(&connection.client));
        }
        match self.settings.mcp_servers.get(server) {
            Some(config) if config.disabled => Err(HubError::ServerDisabled(server.to_string())),
            _ => Err(HubError::ServerNotFound(server.to_string())),
        }
    }

    /// Close one server and drop its tools. Unknown names are ignored.
    pub async fn close_server(&self, server: &str) -> Result<()> {
        let connection = {
            let mut state = self.state.write();
            let Some(connection) = state.connections.remove(server) else {
                return Ok(());
            };
            for key in &connection.tool_keys {
                state.tools.remove(key);
            }
            connection
        };

        info!(server = %server, "Closing server");
        connection.client.close().await
    }

    /// Close every connection and clear the registry.
    ///
    /// Safe to call more than once. Close failures are collected and reported together
    /// after every connection has been attempted.
    pub async fn close_servers(&self) -> Result<()> {
        let connections = {
            let mut state = self.state.write();
            state.tools.clear();
            state.status = HubStatus::Closed;
            std::mem::take(&mut state.connections)
        };

        if !connections.is_empty() {
            info!(count = connections.len(), "Closing MCP servers");
        }
        let clients: Vec<(String, Arc<dyn ToolClient>)> = connections
            .into_iter()
            .map(|(name, c)| (name, c.client))
            .collect();
        close_all(clients).await
    }

    async fn initialize(
        &self,
        prebuilt: Vec<(String, Arc<dyn ToolClient>)>,
    ) -> Result<()> {
        self.state.write().status = HubStatus::Initializing;

        let mut opened: Vec<(String, ServerConfig, Arc<dyn ToolClient>)> = Vec::new();
        for (name, client) in prebuilt {
            let config = self
                .settings
                .mcp_servers
                .get(&name)
                .cloned()
                .unwrap_or_default();
            opened.push((name, config, client));
        }

        // Owned copies keep no settings borrow alive across the connect awaits.
        let enabled: Vec<(String, ServerConfig)> = self
            .settings
            .enabled_servers()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect();
        for (name, config) in enabled {
            if opened.iter().any(|(existing, _, _)| *existing == name) {
                debug!(server = %name, "Using pre-built client");
                continue;
            }
            match create_client(&name, &config).await {
                Ok(client) => opened.push((name, config, client)),
                Err(e) => {
                    abandon(opened).await;
                    return Err(HubError::InitializeServers {
                        server: name,
                        source: Box::new(e),
                    });
                }
            }
        }

        let mut discovered = Vec::with_capacity(opened.len());
        let mut failure = None;
        for (name, _, client) in &opened {
            match client.list_tools().await {
                Ok(tools) => discovered.push(tools),
                Err(e) => {
                    failure = Some((name.clone(), e));
                    break;
                }
            }
        }
        if let Some((server, e)) = failure {
            abandon(opened).await;
            return Err(HubError::InitializeServers {
                server,
                source: Box::new(e),
            });
        }

        let mut state = self.state.write();
        for ((name, config, client), tools) in opened.into_iter().zip(discovered) {
            let tool_keys = register_tools(&mut state.tools, &name, &config, &client, tools);
            info!(server = %name, tool_count = tool_keys.len(), "Registered server tools");
            state.connections.insert(
                name,
                Connection {
                    config,
                    client,
                    tool_keys,
                },
            );
        }
        state.status = HubStatus::Ready;
        Ok(())
    }

    /// Config the named server was started with.
    pub fn server_config(&self, server: &str) -> Option<ServerConfig> {
        self.state
            .read()
            .connections
            .get(server)
            .map(|c| c.config.clone())
    }
}

/// Filter, normalize and insert the tools of one server. Returns the keys inserted.
fn register_tools(
    registry: &mut BTreeMap<String, HubTool>,
    server: &str,
    config: &ServerConfig,
    client: &Arc<dyn ToolClient>,
    tools: Vec<ToolDefinition>,
) -> Vec<String> {
    let admission = if config.has_allow_list() {
        Admission::AllowListed
    } else {
        Admission::AllowAll
    };

    let mut keys = Vec::new();
    for tool in tools {
        if !config.allows_tool(&tool.name) {
            debug!(server = %server, tool = %tool.name, "Tool not on allow-list");
            continue;
        }
        if config.excludes_tool(&tool.name) {
            debug!(server = %server, tool = %tool.name, "Tool excluded");
            continue;
        }

        let schema = match normalize_schema(&tool.input_schema) {
            Ok(schema) => schema,
            Err(e) => {
                warn!(server = %server, tool = %tool.name, error = %e, "Skipping tool with unusable schema");
                continue;
            }
        };

        let key = tool_key(server, &tool.name);
        let entry = HubTool {
            key: key.clone(),
            server_name: server.to_string(),
            tool_name: tool.name,
            description: tool.description,
            schema,
            admission,
            client: Arc::clone(client),
        };
        if registry.insert(key.clone(), entry).is_some() {
            warn!(tool = %key, "Tool key registered twice; keeping the latest");
        }
        keys.push(key);
    }
    keys
}

/// Close clients opened during a failed startup.
async fn abandon(opened: Vec<(String, ServerConfig, Arc<dyn ToolClient>)>) {
    let clients: Vec<(String, Arc<dyn ToolClient>)> = opened
        .into_iter()
        .map(|(name, _, client)| (name, client))
        .collect();
    if let Err(e) = close_all(clients).await {
        warn!(error = %e, "Failed to close connections after startup failure");
    }
}

async fn close_all(clients: Vec<(String, Arc<dyn ToolClient>)>) -> Result<()> {
    let mut errors = Vec::new();
    for (name, client) in clients {
        if let Err(e) = client.close().await {
            warn!(server = %name, error = %e, "Failed to close server");
            errors.push(format!("{name}: {e}"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(HubError::Close(errors))
    }
}

/// Builder for [`McpHub`].
///
/// Pre-built clients registered with [`McpHubBuilder::client`] join the hub under their
/// given name, alongside (or instead of) the servers from the settings document.
#[derive(Default)]
pub struct McpHubBuilder {
    settings: McpSettings,
    clients: Vec<(String, Arc<dyn ToolClient>)>,
}

impl McpHubBuilder {
    pub fn settings(mut self, settings: McpSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn client(mut self, name: impl Into<String>, client: Arc<dyn ToolClient>) -> Self {
        self.clients.push((name.into(), client));
        self
    }

    pub async fn build(self) -> Result<McpHub> {
        let mut settings = self.settings;
        validate_settings(&mut settings).map_err(mcphost_core::ConfigError::invalid)?;

        let hub = McpHub {
            settings,
            state: RwLock::new(HubState {
                status: HubStatus::Uninitialized,
                connections: BTreeMap::new(),
                tools: BTreeMap::new(),
            }),
        };
        hub.initialize(self.clients).await?;
        info!(
            servers = hub.server_names().len(),
            tools = hub.state.read().tools.len(),
            "MCP hub ready"
        );
        Ok(hub)
    }
}
