use std::time::Duration;

use webserv::config::{Config, LISTEN_ENV};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.limits.max_header_bytes, 8192);
    assert_eq!(cfg.limits.max_body_bytes, 10 * 1024 * 1024);
    assert_eq!(cfg.timeouts.idle, Duration::from_secs(30));
    assert_eq!(cfg.timeouts.shutdown_grace, Duration::from_secs(10));
}

#[test]
fn test_config_empty_document_is_default() {
    let cfg = Config::from_yaml_str("").unwrap();
    assert_eq!(cfg.server.listen_addr, Config::default().server.listen_addr);
}

#[test]
fn test_config_partial_yaml() {
    let cfg = Config::from_yaml_str(
        r#"
server:
  listen_addr: 0.0.0.0:3000
limits:
  max_header_bytes: 4096
timeouts:
  idle_secs: 2.5
  handler_secs: 1
"#,
    )
    .unwrap();

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.server.backlog, 1024);
    assert_eq!(cfg.limits.max_header_bytes, 4096);
    assert_eq!(cfg.limits.max_body_bytes, 10 * 1024 * 1024);
    assert_eq!(cfg.timeouts.idle, Duration::from_millis(2500));
    assert_eq!(cfg.timeouts.handler, Duration::from_secs(1));
    assert_eq!(cfg.timeouts.shutdown_grace, Duration::from_secs(10));

    let settings = cfg.connection_settings();
    assert_eq!(settings.limits.max_header_bytes, 4096);
    assert_eq!(settings.idle_timeout, Duration::from_millis(2500));
}

#[test]
fn test_config_rejects_unknown_fields() {
    assert!(Config::from_yaml_str("server:\n  listen: 1.2.3.4:80\n").is_err());
}

#[test]
fn test_config_rejects_invalid_values() {
    assert!(Config::from_yaml_str("limits:\n  max_connections: 0\n").is_err());
    assert!(Config::from_yaml_str("timeouts:\n  idle_secs: -1\n").is_err());
    assert!(Config::from_yaml_str("timeouts:\n  handler_secs: 0\n").is_err());
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("webserv-test-{}.yaml", std::process::id()));
    std::fs::write(&path, "server:\n  backlog: 16\n").unwrap();

    let cfg = Config::from_file(&path).unwrap();
    assert_eq!(cfg.server.backlog, 16);

    std::fs::remove_file(&path).unwrap();
    assert!(Config::from_file(&path).is_err());
}

// The only test touching the environment, so nothing races on it.
#[test]
fn test_config_listen_env_override() {
    unsafe {
        std::env::set_var(LISTEN_ENV, "0.0.0.0:5000");
    }
    let mut cfg = Config::default();
    cfg.apply_env();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:5000");

    unsafe {
        std::env::remove_var(LISTEN_ENV);
    }
    let mut cfg = Config::default();
    cfg.apply_env();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
}
