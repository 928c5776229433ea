use spartoi::config::{Config, ListenerConfig};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(
        cfg.listeners,
        vec![ListenerConfig {
            ip: "127.0.0.1".to_string(),
            port: 300,
        }]
    );
    assert_eq!(cfg.worker_threads, 1);
    assert!(cfg.backends.is_empty());
    assert_eq!(cfg.proxy.connect_timeout(), Duration::from_secs(5));
    assert_eq!(cfg.proxy.request_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.proxy.max_response_body, 16 * 1024 * 1024);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
listeners:
  - ip: "0.0.0.0"
    port: 3000
  - ip: "::1"
worker_threads: 4
backends:
  - url: "http://127.0.0.1:8080"
    name: "capsule"
  - url: "http://127.0.0.1:8081"
proxy:
  connect_timeout_secs: 2
client:
  timeout: 2.5
  accepted_mimes: ["text/gemini"]
"#;
    let cfg = Config::from_yaml_str(yaml).unwrap();

    assert_eq!(cfg.listeners.len(), 2);
    assert_eq!(cfg.listeners[0].socket_addr().unwrap().to_string(), "0.0.0.0:3000");
    assert_eq!(cfg.listeners[1].port, 300);
    assert_eq!(cfg.worker_threads, 4);
    assert_eq!(cfg.backends[0].name.as_deref(), Some("capsule"));
    assert!(cfg.backends[1].name.is_none());
    assert_eq!(cfg.proxy.connect_timeout(), Duration::from_secs(2));
    // Unset keys keep their defaults
    assert_eq!(cfg.proxy.request_timeout(), Duration::from_secs(30));

    let client = cfg.client.to_client_config();
    assert_eq!(client.timeout, Some(Duration::from_millis(2500)));
    assert_eq!(client.accepted_mimes, vec!["text/gemini".to_string()]);
}

#[test]
fn test_config_client_limits_disabled() {
    let yaml = r#"
client:
  timeout: 0
  max_body_size: -1
  max_transfer_duration: 0
"#;
    let client = Config::from_yaml_str(yaml).unwrap().client.to_client_config();

    assert_eq!(client.timeout, None);
    assert_eq!(client.max_body_size, None);
    assert_eq!(client.max_transfer_duration, None);
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "worker_threads: 2").unwrap();

    let cfg = Config::from_file(file.path()).unwrap();
    assert_eq!(cfg.worker_threads, 2);
}

#[test]
fn test_config_missing_file() {
    assert!(Config::from_file("/nonexistent/spartoi.yaml").is_err());
}

#[test]
fn test_config_listen_override() {
    let cfg = Config::default()
        .with_listen_override(Some("0.0.0.0:5000"))
        .unwrap();

    assert_eq!(cfg.listeners.len(), 1);
    assert_eq!(cfg.listeners[0].ip, "0.0.0.0");
    assert_eq!(cfg.listeners[0].port, 5000);

    let untouched = Config::default().with_listen_override(None).unwrap();
    assert_eq!(untouched.listeners, Config::default().listeners);
}

#[test]
fn test_config_listen_override_rejects_garbage() {
    assert!(Config::default().with_listen_override(Some("localhost")).is_err());
}

#[test]
fn test_config_validation() {
    let mut cfg = Config::default();
    cfg.worker_threads = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.listeners[0].ip = "not-an-ip".to_string();
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.listeners[0].ip.clear();
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.proxy.max_response_body = 0;
    assert!(cfg.validate().is_err());
}
