//! STDIO transport for MCP servers
//!
//! Spawns the server as a child process and speaks MCP over its stdin/stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use mcphost_core::TransportKind;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{create_client_handler, serve_with_timeout, Transport};
use crate::client::McpClient;
use crate::error::{HubError, Result};

/// STDIO transport for child process MCP servers
pub struct StdioTransport {
    server_name: String,
    command: String,
    args: Vec<String>,
    /// `KEY=VALUE` entries layered over the inherited environment
    env: Option<Vec<String>>,
    connect_timeout: Duration,
}

impl StdioTransport {
    pub fn new(
        server_name: &str,
        command: String,
        args: Vec<String>,
        env: Option<Vec<String>>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            server_name: server_name.to_string(),
            command,
            args,
            env,
            connect_timeout,
        }
    }

    /// Split a command that carries its own arguments.
    ///
    /// Configs copied from desktop MCP clients often look like `"npx -y @scope/server"`
    /// with no separate `args`; those are split with shell quoting rules. When `args` is
    /// non-empty the command is taken verbatim as the executable.
    pub fn parse_command(
        command: &str,
        args: &[String],
    ) -> std::result::Result<(String, Vec<String>), String> {
        let command = command.trim();
        if !args.is_empty() || !command.contains(char::is_whitespace) {
            return Ok((command.to_string(), args.to_vec()));
        }

        let mut parts = shell_words::split(command)
            .map_err(|e| format!("failed to parse command '{command}': {e}"))?
            .into_iter();
        let executable = parts
            .next()
            .ok_or_else(|| "empty command after parsing".to_string())?;
        Ok((executable, parts.collect()))
    }

    fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .flatten()
            .filter_map(|entry| entry.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> Result<McpClient> {
        let (executable, args) = Self::parse_command(&self.command, &self.args)
            .map_err(|message| HubError::connect(&self.server_name, message))?;

        info!(
            server = %self.server_name,
            executable = %executable,
            args = ?args,
            "Connecting to STDIO server"
        );

        let command_path = which::which(&executable).map_err(|_| {
            HubError::connect(
                &self.server_name,
                format!("command not found: {executable}. Ensure it's installed and in PATH."),
            )
        })?;
        debug!(server = %self.server_name, path = ?command_path, "Found command");

        let env = self.env_pairs();
        let transport = TokioChildProcess::new(Command::new(&command_path).configure(move |cmd| {
            cmd.args(&args)
                .envs(env.iter().map(|(key, value)| (key, value)))
                .stderr(Stdio::null())
                .kill_on_drop(true);

            // Keep terminal signals aimed at the host away from server processes.
            #[cfg(unix)]
            {
                cmd.process_group(0);
            }
        }))
        .map_err(|e| HubError::connect(&self.server_name, format!("failed to spawn process: {e}")))?;

        let handler = create_client_handler(&self.server_name);
        serve_with_timeout(&self.server_name, self.connect_timeout, handler.serve(transport)).await
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
