use std::path::Path;

use routescope::config::{AppConfig, ConfigError, LoggingConfig};
use routescope::logging::init_logging;

mod common;
use common::temp_files::{create_temp_config, create_temp_toml, create_temp_yaml};

#[test]
fn test_load_yaml_file() {
    let file = create_temp_yaml(
        "server:\n  addr: 127.0.0.1:3000\n  workers: 2\nlogging:\n  level: debug\n  json: true\n",
    );
    let cfg = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.server.addr, "127.0.0.1:3000");
    assert_eq!(cfg.server.workers, 2);
    assert_eq!(cfg.logging.level, "debug");
    assert!(cfg.logging.json);
}

#[test]
fn test_load_toml_file() {
    let file = create_temp_toml("[server]\nbase_path = \"/svc\"\n");
    let cfg = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.server.base_path, "/svc");
    assert_eq!(cfg.server.addr, "0.0.0.0:8080");
}

#[test]
fn test_unsupported_extension() {
    let file = create_temp_config("{}", "json");
    assert!(matches!(
        AppConfig::from_file(file.path()),
        Err(ConfigError::UnsupportedFormat(ext)) if ext == "json"
    ));
}

#[test]
fn test_missing_file() {
    let err = AppConfig::from_file(Path::new("does/not/exist.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("does/not/exist.yaml"));
}

#[test]
fn test_malformed_yaml() {
    let file = create_temp_yaml("server: [unclosed\n");
    assert!(matches!(
        AppConfig::from_file(file.path()),
        Err(ConfigError::Yaml(_))
    ));
}

#[test]
fn test_init_logging_is_idempotent() {
    let config = LoggingConfig {
        level: "warn".to_string(),
        json: true,
    };
    init_logging(&config).unwrap();
    init_logging(&LoggingConfig::default()).unwrap();
}
