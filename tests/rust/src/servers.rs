//! In-process MCP servers
//!
//! [`ArithmeticServer`] answers `sum`, `multiply` and `echo`. It is served over streamable
//! HTTP with rmcp's own service, over legacy SSE with a small axum app, and over stdio by
//! the `test-mcp-server` binary.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Test server exposing arithmetic tools.
#[derive(Clone, Default)]
pub struct ArithmeticServer {
    /// Also expose `read_env`, which returns an environment variable of the server process
    pub env_tool: bool,
}

impl ArithmeticServer {
    pub fn with_env_tool() -> Self {
        Self { env_tool: true }
    }

    fn schema(value: Value) -> Arc<JsonObject> {
        Arc::new(value.as_object().cloned().unwrap_or_default())
    }

    fn tools(&self) -> Vec<Tool> {
        let pair = Self::schema(json!({
            "type": "object",
            "properties": {
                "a": {"type": "number", "description": "First operand", "default": 1},
                "b": {"type": "number", "description": "Second operand", "default": 2}
            }
        }));

        let mut tools = vec![
            Tool::new("sum", "Add two numbers", Arc::clone(&pair)),
            Tool::new("multiply", "Multiply two numbers", pair),
            Tool::new(
                "echo",
                "Echo a message back",
                Self::schema(json!({
                    "type": "object",
                    "properties": {"message": {"type": "string", "default": "hello"}}
                })),
            ),
        ];
        if self.env_tool {
            tools.push(Tool::new(
                "read_env",
                "Read an environment variable of the server process",
                Self::schema(json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                })),
            ));
        }
        tools
    }
}

fn number(args: &JsonObject, key: &str, default: f64) -> Result<f64, McpError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| McpError::invalid_params(format!("'{key}' must be a number"), None)),
    }
}

fn string<'a>(args: &'a JsonObject, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or(default)
}

impl ServerHandler for ArithmeticServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "arithmetic-test-server".to_string(),
                version: "1.0.0".to_string(),
                ..Default::default()
            },
            instructions: None,
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.arguments.unwrap_or_default();
        let text = match params.name.as_ref() {
            "sum" => (number(&args, "a", 1.0)? + number(&args, "b", 2.0)?).to_string(),
            "multiply" => (number(&args, "a", 1.0)? * number(&args, "b", 2.0)?).to_string(),
            "echo" => format!("Echo: {}", string(&args, "message", "hello")),
            "read_env" if self.env_tool => {
                std::env::var(string(&args, "name", "")).unwrap_or_default()
            }
            other => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "unknown tool: {other}"
                ))]))
            }
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

/// A running test server. Cancelling the token shuts it down.
pub struct TestServer {
    pub url: String,
    pub cancel: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve_router(router: Router, path: &str) -> TestServer {
    let cancel = CancellationToken::new();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let addr = listener.local_addr().unwrap();
    let url = format!("http://127.0.0.1:{}{}", addr.port(), path);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    TestServer { url, cancel }
}

/// Serve [`ArithmeticServer`] over streamable HTTP at `http://127.0.0.1:<port>/stream`.
pub async fn start_streamable_server() -> TestServer {
    let token = CancellationToken::new();
    let service = StreamableHttpService::new(
        || Ok(ArithmeticServer::default()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(std::time::Duration::from_secs(15)),
            sse_retry: Some(std::time::Duration::from_secs(3)),
            cancellation_token: token.child_token(),
        },
    );

    let server = serve_router(Router::new().nest_service("/stream", service), "/stream").await;
    let stop = server.cancel.clone();
    tokio::spawn(async move {
        stop.cancelled().await;
        token.cancel();
    });
    server
}

type Sessions = Arc<Mutex<HashMap<String, tokio::sync::mpsc::Sender<ClientJsonRpcMessage>>>>;

#[derive(Clone, Default)]
struct SseState {
    sessions: Sessions,
    next_id: Arc<AtomicU64>,
}

/// Serve [`ArithmeticServer`] over the legacy SSE protocol at `http://127.0.0.1:<port>/sse`.
///
/// `GET /sse` opens a session and announces `/message?sessionId=<id>` as the endpoint;
/// `POST /message` feeds the session's server.
pub async fn start_sse_server() -> TestServer {
    let router = Router::new()
        .route("/sse", get(open_session))
        .route("/message", post(post_message))
        .with_state(SseState::default());
    serve_router(router, "/sse").await
}

async fn open_session(
    State(state): State<SseState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = state.next_id.fetch_add(1, Ordering::SeqCst).to_string();

    let (to_server, from_client) = tokio::sync::mpsc::channel::<ClientJsonRpcMessage>(32);
    let (to_client, from_server) = futures::channel::mpsc::channel::<ServerJsonRpcMessage>(32);
    state.sessions.lock().insert(session_id.clone(), to_server);

    let inbound = futures::stream::unfold(from_client, |mut rx| async move {
        rx.recv().await.map(|message| (message, rx))
    })
    .boxed();
    let sessions = Arc::clone(&state.sessions);
    let id = session_id.clone();
    tokio::spawn(async move {
        if let Ok(running) = ArithmeticServer::default().serve((to_client, inbound)).await {
            let _ = running.waiting().await;
        }
        sessions.lock().remove(&id);
    });

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={session_id}"));
    let messages = from_server.map(|message| {
        Ok(Event::default()
            .event("message")
            .data(serde_json::to_string(&message).unwrap_or_default()))
    });

    Sse::new(futures::stream::once(async move { Ok(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::default())
}

async fn post_message(
    State(state): State<SseState>,
    Query(query): Query<HashMap<String, String>>,
    Json(message): Json<ClientJsonRpcMessage>,
) -> impl IntoResponse {
    let sender = query
        .get("sessionId")
        .and_then(|id| state.sessions.lock().get(id).cloned());
    match sender {
        Some(sender) if sender.send(message).await.is_ok() => StatusCode::ACCEPTED,
        _ => StatusCode::NOT_FOUND,
    }
}
