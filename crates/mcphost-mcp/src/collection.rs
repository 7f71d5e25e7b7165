//! One-shot tool selection
//!
//! [`ToolCollection`] loads a hub from a settings file, keeps the requested tools and
//! owns the hub until [`ToolCollection::close`].

use std::path::Path;

use tracing::warn;

use crate::error::Result;
use crate::hub::{HubTool, McpHub};

pub struct ToolCollection {
    hub: Option<McpHub>,
    tools: Vec<HubTool>,
}

impl ToolCollection {
    /// Load the hub described by the settings file at `path` and select `names`.
    ///
    /// An empty `names` selects every tool. Names the hub does not know are logged and
    /// skipped.
    pub async fn load<S: AsRef<str>>(path: impl AsRef<Path>, names: &[S]) -> Result<Self> {
        let hub = McpHub::from_file(path).await?;
        Ok(Self::from_hub(hub, names))
    }

    /// Select `names` from an already connected hub, taking ownership of it.
    pub fn from_hub<S: AsRef<str>>(hub: McpHub, names: &[S]) -> Self {
        let tools = if names.is_empty() {
            hub.get_tools::<&str>(&[]).unwrap_or_default()
        } else {
            names
                .iter()
                .filter_map(|name| match hub.get_tool(name.as_ref()) {
                    Ok(tool) => Some(tool),
                    Err(e) => {
                        warn!(tool = %name.as_ref(), error = %e, "Requested tool not available");
                        None
                    }
                })
                .collect()
        };
        Self {
            hub: Some(hub),
            tools,
        }
    }

    pub fn tools(&self) -> &[HubTool] {
        &self.tools
    }

    pub fn get(&self, key: &str) -> Option<&HubTool> {
        self.tools.iter().find(|t| t.key() == key)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Close the owned hub. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        self.tools.clear();
        match self.hub.take() {
            Some(hub) => hub.close_servers().await,
            None => Ok(()),
        }
    }
}
