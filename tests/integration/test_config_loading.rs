use flowlens::core::config::{find_workspace_root, ConfigLoader, ConfigOverrides, CONFIG_DIR};
use flowlens::core::types::ErrorCategory;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn clear_flowlens_env() {
    for v in &[
        "FLOWLENS_HTTP_URL",
        "FLOWLENS_WS_URL",
        "FLOWLENS_APPROVER",
        "FLOWLENS_APPROVAL_SOURCE",
        "FLOWLENS_TICK_INTERVAL_MS",
        "FLOWLENS_POLL_INTERVAL_SECS",
        "FLOWLENS_HISTORY_LIMIT",
    ] {
        env::remove_var(v);
    }
}

fn write_config(workspace: &Path, content: &str) {
    let dir = workspace.join(CONFIG_DIR);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), content).unwrap();
}

const WORKSPACE_CONFIG: &str = r#"
[engine]
http_url = "http://engine.internal:9000"
ws_url = "ws://engine.internal:9000"

[session]
tick_interval_ms = 250
history_limit = 20

[approval]
approver = "ops@example.com"

[logging]
default_level = "debug"
"#;

#[test]
#[serial]
fn test_defaults_without_workspace() {
    clear_flowlens_env();
    let config = ConfigLoader::load(None, &ConfigOverrides::default()).unwrap();

    insta::assert_debug_snapshot!(config, @r###"
    FlowlensConfig {
        engine: EngineConfig {
            http_url: "http://localhost:8080",
            ws_url: "ws://localhost:8080",
        },
        session: SessionConfig {
            tick_interval_ms: 1000,
            poll_interval_secs: 30,
            history_limit: 50,
        },
        approval: ApprovalConfig {
            approver: "operator",
            source: "flowlens",
        },
    }
    "###);
}

#[test]
#[serial]
fn test_file_values_override_defaults() {
    clear_flowlens_env();
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), WORKSPACE_CONFIG);

    let config = ConfigLoader::load(Some(temp_dir.path()), &ConfigOverrides::default()).unwrap();
    assert_eq!(config.engine.http_url, "http://engine.internal:9000");
    assert_eq!(config.session.tick_interval_ms, 250);
    assert_eq!(config.session.history_limit, 20);
    assert_eq!(config.session.poll_interval_secs, 30);
    assert_eq!(config.approval.approver, "ops@example.com");
    assert_eq!(config.approval.source, "flowlens");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_flowlens_env();
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), WORKSPACE_CONFIG);

    env::set_var("FLOWLENS_HTTP_URL", "https://env.example.com");
    env::set_var("FLOWLENS_HISTORY_LIMIT", "75");
    env::set_var("FLOWLENS_POLL_INTERVAL_SECS", "not-a-number");

    let config = ConfigLoader::load(Some(temp_dir.path()), &ConfigOverrides::default()).unwrap();
    assert_eq!(config.engine.http_url, "https://env.example.com");
    assert_eq!(config.engine.ws_url, "ws://engine.internal:9000");
    assert_eq!(config.session.history_limit, 75);
    assert_eq!(config.session.poll_interval_secs, 30);

    clear_flowlens_env();
}

#[test]
#[serial]
fn test_cli_overrides_env_and_file() {
    clear_flowlens_env();
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), WORKSPACE_CONFIG);
    env::set_var("FLOWLENS_APPROVER", "env-approver");
    env::set_var("FLOWLENS_WS_URL", "wss://env.example.com");

    let overrides = ConfigOverrides {
        http_url: Some("http://cli.example.com".to_string()),
        ws_url: None,
        approver: Some("cli-approver".to_string()),
    };
    let config = ConfigLoader::load(Some(temp_dir.path()), &overrides).unwrap();
    assert_eq!(config.engine.http_url, "http://cli.example.com");
    assert_eq!(config.engine.ws_url, "wss://env.example.com");
    assert_eq!(config.approval.approver, "cli-approver");

    clear_flowlens_env();
}

#[test]
#[serial]
fn test_invalid_values_fail_validation() {
    clear_flowlens_env();
    let temp_dir = TempDir::new().unwrap();
    write_config(
        temp_dir.path(),
        r#"
[session]
history_limit = 500
"#,
    );

    let err = ConfigLoader::load(Some(temp_dir.path()), &ConfigOverrides::default()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert_eq!(err.code, "FL-CONFIG-002");

    let overrides = ConfigOverrides {
        http_url: Some("ftp://engine".to_string()),
        ..ConfigOverrides::default()
    };
    let err = ConfigLoader::load(None, &overrides).unwrap_err();
    assert_eq!(err.code, "FL-CONFIG-002");
}

#[test]
#[serial]
fn test_unparseable_file_is_config_error() {
    clear_flowlens_env();
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path(), "[engine\nhttp_url = ");

    let err = ConfigLoader::load_from_workspace(temp_dir.path()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert_eq!(err.code, "FL-CONFIG-001");
}

#[test]
fn test_workspace_root_found_from_nested_directory() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join(CONFIG_DIR)).unwrap();
    let nested = temp_dir.path().join("flows").join("billing");
    fs::create_dir_all(&nested).unwrap();

    assert_eq!(
        find_workspace_root(&nested).as_deref(),
        Some(temp_dir.path())
    );
}
