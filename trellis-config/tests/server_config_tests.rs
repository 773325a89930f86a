//! Loading `ServerConfig` from files

use std::io::Write;
use trellis_config::{ConfigError, ConfigManager, FileFormat, ServerConfig, Validate};

fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("trellis-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn test_from_toml_file() {
    let path = temp_file(
        "server.toml",
        r#"
        host = "0.0.0.0"
        port = 0
        max_body_size = 1024
        log_format = "compact"
        "#,
    );

    let config = ServerConfig::from_file(&path).unwrap();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 0);
    assert_eq!(config.max_body_size, 1024);
    assert_eq!(config.log_format, "compact");
    assert_eq!(config.log_level, "info");
}

#[test]
fn test_from_env_file_coerces_values() {
    let path = temp_file("server.env", "PORT=9100\nSHUTDOWN_TIMEOUT_SECS=5\n");

    let config = ServerConfig::from_file(&path).unwrap();
    assert_eq!(config.port, 9100);
    assert_eq!(config.shutdown_timeout_secs, 5);
}

#[test]
fn test_invalid_file_settings_fail_validation() {
    let path = temp_file("bad.json", r#"{"log_level": "chatty"}"#);

    let err = ServerConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn test_unsupported_extension() {
    let err = ServerConfig::from_file("settings.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::LoadError(_)));
}

#[test]
fn test_manager_round_trip_into_typed_config() {
    let manager = ConfigManager::with_prefix("TRELLIS_TESTS_UNSET");
    manager
        .load_str("host = \"example.internal\"\nport = 4000", FileFormat::Toml)
        .unwrap();
    manager.load_env().unwrap();

    let config: ServerConfig = manager.load_validated().unwrap();
    assert_eq!(config.address(), "example.internal:4000");
    assert!(config.validate().is_ok());
}
