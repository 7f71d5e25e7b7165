//! In-memory [`ToolClient`] for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::model::JsonObject;
use serde_json::{json, Value};

use crate::client::{ToolClient, ToolDefinition};
use crate::error::{HubError, Result};

pub struct MockClient {
    tools: Vec<ToolDefinition>,
    fail_list: bool,
    fail_close: bool,
    closed: AtomicBool,
    calls: AtomicUsize,
    last_arguments: Mutex<Option<Option<JsonObject>>>,
}

fn number_pair_schema() -> JsonObject {
    json!({
        "type": "object",
        "properties": {
            "a": {"type": "number"},
            "b": {"type": "number"}
        },
        "required": ["a", "b"]
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

impl MockClient {
    /// `sum`, `multiply` and `echo`.
    pub fn arithmetic() -> Self {
        let echo_schema = json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        Self {
            tools: vec![
                ToolDefinition::new("sum", "Add two numbers", number_pair_schema()),
                ToolDefinition::new("multiply", "Multiply two numbers", number_pair_schema()),
                ToolDefinition::new("echo", "Echo a message", echo_schema),
            ],
            fail_list: false,
            fail_close: false,
            closed: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_arguments: Mutex::new(None),
        }
    }

    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent call; `None` if never called.
    pub fn last_arguments(&self) -> Option<Option<JsonObject>> {
        self.last_arguments.lock().clone()
    }
}

#[async_trait]
impl ToolClient for MockClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        if self.fail_list {
            return Err(HubError::connect("mock", "list failed"));
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Option<JsonObject>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_arguments.lock() = Some(arguments.clone());

        let args = arguments.unwrap_or_default();
        let number = |key: &str| args.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        match name {
            "sum" => Ok((number("a") + number("b")).to_string()),
            "multiply" => Ok((number("a") * number("b")).to_string()),
            "echo" => Ok(format!(
                "Echo: {}",
                args.get("message").and_then(Value::as_str).unwrap_or_default()
            )),
            other => Err(HubError::ToolCall {
                tool: other.to_string(),
                message: "unknown tool".to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            return Err(HubError::connect("mock", "close failed"));
        }
        Ok(())
    }
}
