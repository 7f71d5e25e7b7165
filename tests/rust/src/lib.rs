//! Shared test utilities and fixtures for McpHost integration tests.

use std::path::PathBuf;
use std::sync::Once;

use mcphost_core::{McpSettings, ServerConfig, TransportKind};

/// MCP servers the tests connect to
pub mod servers;
pub use servers::{start_sse_server, start_streamable_server, ArithmeticServer, TestServer};

/// Path of the stdio test server binary built alongside the tests.
///
/// Integration tests read it from `CARGO_BIN_EXE_test-mcp-server`; the binary exposes the
/// [`ArithmeticServer`] tools plus `read_env`.
pub fn stdio_server_config(binary: &str) -> ServerConfig {
    let mut config = ServerConfig::stdio(binary, vec![]);
    config.timeout = Some(std::time::Duration::from_secs(10));
    config
}

/// Config for a network server at `url`.
pub fn remote_config(transport: TransportKind, url: &str) -> ServerConfig {
    let mut config = ServerConfig::remote(transport, url);
    config.timeout = Some(std::time::Duration::from_secs(10));
    config
}

/// Settings document holding a single server.
pub fn single_server(name: &str, config: ServerConfig) -> McpSettings {
    McpSettings::default().with_server(name, config)
}

/// Write `contents` to `file_name` inside `dir` and return the path.
pub fn write_settings_file(dir: &tempfile::TempDir, file_name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(file_name);
    std::fs::write(&path, contents).expect("write settings file");
    path
}

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn").add_directive("mcphost_mcp=debug".parse().unwrap()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
