//! HTTP transport for MCP servers
//!
//! Both `http` and `streamable` servers are reached with the streamable HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use mcphost_core::{expand_env_vars, TransportKind};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use tracing::info;

use super::{create_client_handler, serve_with_timeout, Transport};
use crate::client::McpClient;
use crate::error::{HubError, Result};

/// Streamable HTTP transport
pub struct HttpTransport {
    server_name: String,
    url: String,
    kind: TransportKind,
    connect_timeout: Duration,
}

impl HttpTransport {
    /// `url` may contain `${VAR}` tokens; they are substituted from the environment.
    pub fn new(server_name: &str, url: &str, kind: TransportKind, connect_timeout: Duration) -> Self {
        Self {
            server_name: server_name.to_string(),
            url: expand_env_vars(url),
            kind,
            connect_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| {
                HubError::connect(&self.server_name, format!("failed to build HTTP client: {e}"))
            })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<McpClient> {
        info!(
            server = %self.server_name,
            url = %self.url,
            "Connecting to HTTP server"
        );

        let client = self.build_http_client()?;
        let transport_config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        let transport = StreamableHttpClientTransport::with_client(client, transport_config);

        let handler = create_client_handler(&self.server_name);
        serve_with_timeout(&self.server_name, self.connect_timeout, handler.serve(transport)).await
    }

    fn kind(&self) -> TransportKind {
        self.kind.clone()
    }

    fn description(&self) -> String {
        format!("{}:{}", self.kind, self.url)
    }
}
