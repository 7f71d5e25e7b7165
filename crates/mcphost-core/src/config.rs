//! `mcpServers` settings document
//!
//! The document follows the de-facto MCP client format:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "github": { "command": "npx", "args": ["-y", "@modelcontextprotocol/server-github"] },
//!     "search": { "transport": "streamable", "url": "http://localhost:${PORT}/mcp" }
//!   }
//! }
//! ```
//!
//! A server without an explicit `transport` is auto-detected during validation and the
//! resolved value is written back, so the client factory and pool fingerprinting always
//! see a concrete transport.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::ConfigError;

/// Timeout applied when a server does not configure one.
pub const DEFAULT_MCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Smallest timeout a server may configure.
pub const MIN_MCP_TIMEOUT: Duration = Duration::from_secs(5);

/// URL path suffix that auto-detects as the SSE transport.
pub const SSE_PATH_SUFFIX: &str = "/mcp";

lazy_static! {
    static ref ENV_VAR_REGEX: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
}

/// Transport used to reach one server.
///
/// Unrecognised strings are kept as [`TransportKind::Unknown`] so that a document with a
/// typo still parses and fails validation with a readable message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransportKind {
    /// Not set; resolved from `url` / `command` during validation
    #[default]
    Auto,
    Stdio,
    Sse,
    Http,
    Streamable,
    Unknown(String),
}

impl TransportKind {
    pub fn as_str(&self) -> &str {
        match self {
            TransportKind::Auto => "",
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Http => "http",
            TransportKind::Streamable => "streamable",
            TransportKind::Unknown(other) => other,
        }
    }

    /// Human-facing name used in validation messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            TransportKind::Auto | TransportKind::Stdio => "stdio",
            TransportKind::Sse => "SSE",
            TransportKind::Http => "HTTP",
            TransportKind::Streamable => "streamable HTTP",
            TransportKind::Unknown(_) => "unknown",
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, TransportKind::Auto)
    }

    /// SSE, plain HTTP and streamable HTTP all reach the server over the network.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            TransportKind::Sse | TransportKind::Http | TransportKind::Streamable
        )
    }
}

impl From<String> for TransportKind {
    fn from(value: String) -> Self {
        TransportKind::from(value.as_str())
    }
}

impl From<&str> for TransportKind {
    fn from(value: &str) -> Self {
        match value.trim() {
            "" => TransportKind::Auto,
            "stdio" => TransportKind::Stdio,
            "sse" => TransportKind::Sse,
            "http" => TransportKind::Http,
            "streamable" | "streamable-http" | "streamable_http" => TransportKind::Streamable,
            other => TransportKind::Unknown(other.to_string()),
        }
    }
}

impl From<TransportKind> for String {
    fn from(value: TransportKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One server entry of the settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "TransportKind::is_auto")]
    pub transport: TransportKind,

    // --- Stdio transport ---
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub args: Vec<String>,
    /// `None` adds nothing to the child environment; `Some` of an empty map is kept
    /// distinct so callers can tell "not configured" from "configured empty".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,

    // --- Network transports ---
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    // --- Common ---
    /// Timeout in nanoseconds on the wire; `0` means unset.
    #[serde(
        default,
        with = "duration_nanos",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub disabled: bool,
    /// When present and non-empty, only these tools are registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub excluded_tools: Vec<String>,
}

impl ServerConfig {
    /// A stdio server spawned from `command` with `args`.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportKind::Stdio,
            command: command.into(),
            args,
            ..Default::default()
        }
    }

    /// A network server reached at `url` over `transport`.
    pub fn remote(transport: TransportKind, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            ..Default::default()
        }
    }

    /// Configured timeout, or [`DEFAULT_MCP_TIMEOUT`] when unset.
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_MCP_TIMEOUT)
    }

    pub fn is_sse_transport(&self) -> bool {
        self.transport == TransportKind::Sse
    }

    /// Plain HTTP and streamable HTTP.
    pub fn is_http_transport(&self) -> bool {
        matches!(
            self.transport,
            TransportKind::Http | TransportKind::Streamable
        )
    }

    /// Stdio, including an unset transport.
    pub fn is_stdio_transport(&self) -> bool {
        matches!(self.transport, TransportKind::Stdio | TransportKind::Auto)
    }

    /// Auto-detect a transport from the connection target.
    ///
    /// A URL wins over a command. URLs ending exactly in [`SSE_PATH_SUFFIX`] are SSE
    /// endpoints; any other URL, `.../mcp/` included, is plain HTTP.
    pub fn detect_transport(&self) -> Option<TransportKind> {
        let url = self.url.trim();
        if !url.is_empty() {
            if url.ends_with(SSE_PATH_SUFFIX) {
                return Some(TransportKind::Sse);
            }
            return Some(TransportKind::Http);
        }
        if !self.command.trim().is_empty() {
            return Some(TransportKind::Stdio);
        }
        None
    }

    /// The transport validation would settle on, without mutating `self`.
    pub fn effective_transport(&self) -> TransportKind {
        match &self.transport {
            TransportKind::Auto => self.detect_transport().unwrap_or(TransportKind::Auto),
            other => other.clone(),
        }
    }

    /// Whether `tool` passes the allow-list.
    pub fn allows_tool(&self, tool: &str) -> bool {
        match &self.allowed_tools {
            Some(allowed) if !allowed.is_empty() => allowed.iter().any(|t| t == tool),
            _ => true,
        }
    }

    /// Whether `tool` is on the deny-list.
    pub fn excludes_tool(&self, tool: &str) -> bool {
        self.excluded_tools.iter().any(|t| t == tool)
    }

    pub fn has_allow_list(&self) -> bool {
        self.allowed_tools.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// Root of the settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpSettings {
    #[serde(rename = "mcpServers", default, deserialize_with = "null_as_default")]
    pub mcp_servers: BTreeMap<String, ServerConfig>,
}

impl McpSettings {
    /// Servers that are not disabled, in name order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &ServerConfig)> {
        self.mcp_servers.iter().filter(|(_, config)| !config.disabled)
    }

    pub fn with_server(mut self, name: impl Into<String>, config: ServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), config);
        self
    }
}

/// Validate every enabled server, resolving auto-detected transports in place.
pub fn validate_settings(settings: &mut McpSettings) -> Result<(), ConfigError> {
    for (name, config) in settings.mcp_servers.iter_mut() {
        if config.disabled {
            continue;
        }
        validate_server_config(name, config)?;
    }
    Ok(())
}

/// Validate a single server entry.
///
/// Leaves `config.transport` set to the resolved transport on success.
pub fn validate_server_config(name: &str, config: &mut ServerConfig) -> Result<(), ConfigError> {
    let resolved = match &config.transport {
        TransportKind::Auto => {
            let detected =
                config
                    .detect_transport()
                    .ok_or_else(|| ConfigError::UnsupportedTransport {
                        server: name.to_string(),
                        transport: String::new(),
                    })?;
            debug!(server = %name, transport = %detected, "Auto-detected transport");
            detected
        }
        explicit => explicit.clone(),
    };

    match &resolved {
        TransportKind::Stdio => {
            if config.command.trim().is_empty() {
                return Err(ConfigError::MissingCommand {
                    server: name.to_string(),
                });
            }
        }
        TransportKind::Sse | TransportKind::Http | TransportKind::Streamable => {
            if config.url.trim().is_empty() {
                return Err(ConfigError::MissingUrl {
                    server: name.to_string(),
                    transport: resolved.display_name(),
                });
            }
        }
        TransportKind::Auto | TransportKind::Unknown(_) => {
            return Err(ConfigError::UnsupportedTransport {
                server: name.to_string(),
                transport: resolved.to_string(),
            });
        }
    }

    if let Some(timeout) = config.timeout {
        if timeout < MIN_MCP_TIMEOUT {
            return Err(ConfigError::TimeoutTooShort {
                server: name.to_string(),
                minimum: MIN_MCP_TIMEOUT,
                actual: timeout,
            });
        }
    }

    config.transport = resolved;
    Ok(())
}

/// Load and validate a settings file.
pub fn load_settings(path: impl AsRef<Path>) -> Result<McpSettings, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_settings_from_str(&text)
}

/// Parse and validate a settings document.
///
/// Blank input is an empty, valid document.
pub fn load_settings_from_str(text: &str) -> Result<McpSettings, ConfigError> {
    if text.trim().is_empty() {
        return Ok(McpSettings::default());
    }
    let mut settings: McpSettings = serde_json::from_str(text)?;
    validate_settings(&mut settings).map_err(ConfigError::invalid)?;
    Ok(settings)
}

/// Replace `${NAME}` tokens with values from the process environment.
///
/// Unset variables expand to the empty string.
pub fn expand_env_vars(text: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(text, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

mod duration_nanos {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
                serializer.serialize_u64(nanos)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let nanos = Option::<u64>::deserialize(deserializer)?;
        Ok(nanos.filter(|n| *n > 0).map(Duration::from_nanos))
    }
}
