//! Stdio MCP server used by the integration tests.
//!
//! Serves the arithmetic tools plus `read_env` over stdin/stdout. Logs go to stderr.

use anyhow::Result;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tests::ArithmeticServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let service = ArithmeticServer::with_env_tool().serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
