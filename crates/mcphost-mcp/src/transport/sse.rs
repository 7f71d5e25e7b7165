//! Legacy SSE transport for MCP servers
//!
//! The client opens a long-lived `GET` event stream. The server's first `endpoint` event
//! names the URL that accepts JSON-RPC messages via `POST`; every later `message` event
//! carries one server-to-client JSON-RPC message.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use mcphost_core::{expand_env_vars, TransportKind};
use reqwest_eventsource::{retry, Event, EventSource};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::ServiceExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::{create_client_handler, serve_with_timeout, Transport};
use crate::client::McpClient;
use crate::error::{HubError, Result};

const CHANNEL_CAPACITY: usize = 64;

/// Legacy HTTP+SSE transport
pub struct SseTransport {
    server_name: String,
    url: String,
    timeout: Duration,
}

impl SseTransport {
    /// `url` may contain `${VAR}` tokens; they are substituted from the environment.
    pub fn new(server_name: &str, url: &str, timeout: Duration) -> Self {
        Self {
            server_name: server_name.to_string(),
            url: expand_env_vars(url),
            timeout,
        }
    }

    fn fail(&self, message: impl Into<String>) -> HubError {
        HubError::connect(&self.server_name, message)
    }

    /// Open the event stream and wait for the `endpoint` event.
    async fn open_stream(&self, http: &reqwest::Client) -> Result<(Url, EventSource)> {
        let base = Url::parse(&self.url).map_err(|e| self.fail(format!("invalid URL: {e}")))?;

        let mut events = EventSource::new(http.get(base.clone()))
            .map_err(|e| self.fail(format!("failed to open event stream: {e}")))?;
        // A dropped stream ends the session; reconnecting would need a new endpoint.
        events.set_retry_policy(Box::new(retry::Never));

        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) if message.event == "endpoint" => {
                    let endpoint = match base.join(message.data.trim()) {
                        Ok(endpoint) => endpoint,
                        Err(e) => {
                            events.close();
                            return Err(self.fail(format!("invalid endpoint '{}': {e}", message.data)));
                        }
                    };
                    debug!(server = %self.server_name, endpoint = %endpoint, "Received SSE endpoint");
                    return Ok((endpoint, events));
                }
                Ok(Event::Message(message)) => {
                    debug!(
                        server = %self.server_name,
                        event = %message.event,
                        "Ignoring SSE event before endpoint"
                    );
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    events.close();
                    return Err(self.fail(format!("event stream error: {e}")));
                }
            }
        }
        events.close();
        Err(self.fail("event stream ended before endpoint event"))
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self) -> Result<McpClient> {
        info!(
            server = %self.server_name,
            url = %self.url,
            "Connecting to SSE server"
        );

        let http = reqwest::Client::builder()
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| self.fail(format!("failed to build HTTP client: {e}")))?;

        let (endpoint, events) = tokio::time::timeout(self.timeout, self.open_stream(&http))
            .await
            .map_err(|_| HubError::Timeout {
                operation: "connect",
                server: self.server_name.clone(),
                timeout: self.timeout,
            })??;

        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerJsonRpcMessage>(CHANNEL_CAPACITY);
        tokio::spawn(read_events(self.server_name.clone(), events, inbound_tx));

        let (outbound_tx, outbound_rx) =
            futures::channel::mpsc::channel::<ClientJsonRpcMessage>(CHANNEL_CAPACITY);
        tokio::spawn(post_messages(
            self.server_name.clone(),
            http,
            endpoint,
            self.timeout,
            outbound_rx,
        ));

        let inbound: BoxStream<'static, ServerJsonRpcMessage> =
            futures::stream::unfold(inbound_rx, |mut rx| async move {
                rx.recv().await.map(|message| (message, rx))
            })
            .boxed();

        let handler = create_client_handler(&self.server_name);
        serve_with_timeout(
            &self.server_name,
            self.timeout,
            handler.serve((outbound_tx, inbound)),
        )
        .await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn description(&self) -> String {
        format!("sse:{}", self.url)
    }
}

/// Forward `message` events into the service until either side goes away.
async fn read_events(
    server_name: String,
    mut events: EventSource,
    inbound: mpsc::Sender<ServerJsonRpcMessage>,
) {
    loop {
        let event = tokio::select! {
            _ = inbound.closed() => break,
            event = events.next() => event,
        };

        match event {
            Some(Ok(Event::Message(message))) if message.event == "message" => {
                match serde_json::from_str::<ServerJsonRpcMessage>(&message.data) {
                    Ok(message) => {
                        if inbound.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(server = %server_name, error = %e, "Dropping malformed SSE message")
                    }
                }
            }
            Some(Ok(Event::Message(message))) => {
                debug!(server = %server_name, event = %message.event, "Ignoring SSE event");
            }
            Some(Ok(Event::Open)) => {}
            Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                debug!(server = %server_name, "SSE event stream ended");
                break;
            }
            Some(Err(e)) => {
                warn!(server = %server_name, error = %e, "SSE event stream failed");
                break;
            }
        }
    }
    events.close();
}

/// POST every outbound message to the endpoint announced by the server.
async fn post_messages(
    server_name: String,
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    mut outbound: futures::channel::mpsc::Receiver<ClientJsonRpcMessage>,
) {
    while let Some(message) = outbound.next().await {
        let result = http
            .post(endpoint.clone())
            .timeout(timeout)
            .json(&message)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = result {
            warn!(server = %server_name, error = %e, "Failed to post message to SSE endpoint");
        }
    }
    debug!(server = %server_name, "SSE outbound channel closed");
}
