//! Settings loading integration tests
//!
//! Exercises the settings document end to end through files on disk.

use std::collections::HashMap;
use std::time::Duration;

use mcphost_core::{load_settings, ConfigError, McpSettings, ServerConfig, TransportKind};
use pretty_assertions::assert_eq;
use tests::write_settings_file;

#[test]
fn test_load_written_settings() {
    let dir = tempfile::tempdir().unwrap();

    let mut server1 = ServerConfig::stdio("test_command1", vec!["arg1".into(), "arg2".into()]);
    server1.env = Some(HashMap::from([("ENV1".to_string(), "value1".to_string())]));
    server1.disabled = true;
    let mut server2 = ServerConfig::remote(TransportKind::Sse, "http://test-url.com");
    server2.disabled = true;

    let settings = McpSettings::default()
        .with_server("server1", server1.clone())
        .with_server("server2", server2.clone());
    let path = write_settings_file(
        &dir,
        "load_test_mcpservers.json",
        &serde_json::to_string_pretty(&settings).unwrap(),
    );

    let loaded = load_settings(&path).unwrap();
    assert_eq!(loaded.mcp_servers.len(), 2);
    assert_eq!(loaded.mcp_servers["server1"], server1);
    assert_eq!(loaded.mcp_servers["server2"], server2);
}

#[test]
fn test_load_invalid_files() {
    assert!(matches!(
        load_settings("non_existent_config.json"),
        Err(ConfigError::Read { .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = write_settings_file(&dir, "invalid_config.json", "invalid json");
    assert!(matches!(load_settings(&path), Err(ConfigError::Parse(_))));
}

#[test]
fn test_mixed_transports_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings_file(
        &dir,
        "mcpservers.json",
        r#"{
            "mcpServers": {
                "local": { "command": "npx -y @scope/server" },
                "legacy": { "url": "http://localhost:9000/mcp" },
                "api": { "url": "http://localhost:9000/api" },
                "slashed": { "url": "http://localhost:9000/mcp/" },
                "stream": {
                    "transport": "streamable",
                    "url": "http://localhost:8080/stream",
                    "timeout": 60000000000
                }
            }
        }"#,
    );

    let settings = load_settings(&path).unwrap();
    let transports: Vec<(&str, TransportKind)> = settings
        .mcp_servers
        .iter()
        .map(|(name, config)| (name.as_str(), config.transport.clone()))
        .collect();
    assert_eq!(
        transports,
        vec![
            ("api", TransportKind::Http),
            ("legacy", TransportKind::Sse),
            ("local", TransportKind::Stdio),
            ("slashed", TransportKind::Http),
            ("stream", TransportKind::Streamable),
        ]
    );
    assert_eq!(
        settings.mcp_servers["stream"].timeout_duration(),
        Duration::from_secs(60)
    );
    assert_eq!(
        settings.mcp_servers["api"].timeout_duration(),
        mcphost_core::DEFAULT_MCP_TIMEOUT
    );
}

#[test]
fn test_validation_errors_are_wrapped() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        (
            r#"{"mcpServers":{"s":{"transport":"sse"}}}"#,
            "URL is required for SSE transport",
        ),
        (
            r#"{"mcpServers":{"s":{"transport":"streamable","url":"http://h/s","timeout":1000000000}}}"#,
            "timeout must be at least",
        ),
        (
            r#"{"mcpServers":{"s":{"transport":"websocket","url":"ws://h"}}}"#,
            "unsupported transport type",
        ),
    ];

    for (index, (document, expected)) in cases.iter().enumerate() {
        let path = write_settings_file(&dir, &format!("case{index}.json"), document);
        let err = load_settings(&path).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("invalid settings"), "{message}");
        assert!(message.contains(expected), "{message}");
    }
}

#[test]
fn test_disabled_invalid_server_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings_file(
        &dir,
        "disabled.json",
        r#"{"mcpServers":{"off":{"transport":"stdio","disabled":true}}}"#,
    );
    let settings = load_settings(&path).unwrap();
    assert!(settings.mcp_servers["off"].disabled);
    assert_eq!(settings.enabled_servers().count(), 0);
}
