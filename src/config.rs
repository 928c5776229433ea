//! Configuration.
//!
//! Loaded from the YAML file named by `SPARTOI_CONFIG` (or `spartoi.yaml` in
//! the working directory when present), falling back to built-in defaults.
//! `LISTEN=<ip:port>` replaces the listener list with a single listener.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

use crate::spartan::client::ClientConfig;
use crate::spartan::session::DEFAULT_MAX_REQUEST_BODY;
use crate::spartan::url::DEFAULT_PORT;

const DEFAULT_CONFIG_FILE: &str = "spartoi.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listeners: Vec<ListenerConfig>,
    pub worker_threads: usize,
    pub max_request_body: usize,
    pub backends: Vec<BackendConfig>,
    pub proxy: ProxyConfig,
    pub client: ClientSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListenerConfig {
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// An HTTP upstream the proxy handler forwards to.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Largest upstream response body accepted, in bytes
    pub max_response_body: usize,
}

/// Client defaults. Values `<= 0` disable the corresponding limit.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub timeout: f64,
    pub max_body_size: i64,
    pub max_transfer_duration: f64,
    pub accepted_mimes: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listeners: vec![ListenerConfig {
                ip: "127.0.0.1".to_string(),
                port: DEFAULT_PORT,
            }],
            worker_threads: 1,
            max_request_body: DEFAULT_MAX_REQUEST_BODY,
            backends: Vec::new(),
            proxy: ProxyConfig::default(),
            client: ClientSection::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            max_response_body: DEFAULT_MAX_REQUEST_BODY,
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            timeout: 10.0,
            max_body_size: 0xff_ffff,
            max_transfer_duration: 10.0,
            accepted_mimes: Vec::new(),
        }
    }
}

impl ListenerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        if self.ip.is_empty() {
            bail!("listener IP not specified");
        }
        let ip: IpAddr = self
            .ip
            .parse()
            .with_context(|| format!("{} is not a valid IP address", self.ip))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ClientSection {
    pub fn to_client_config(&self) -> ClientConfig {
        let mut config =
            ClientConfig::from_limits(self.timeout, self.max_body_size, self.max_transfer_duration);
        config.accepted_mimes = self.accepted_mimes.clone();
        config
    }
}

impl Config {
    /// Loads the configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let cfg = match std::env::var("SPARTOI_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };

        let cfg = cfg.with_listen_override(std::env::var("LISTEN").ok().as_deref())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    /// Replaces the listeners with `listen` (`ip:port`) when given.
    pub fn with_listen_override(mut self, listen: Option<&str>) -> anyhow::Result<Self> {
        if let Some(listen) = listen {
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("LISTEN={} is not an ip:port pair", listen))?;
            self.listeners = vec![ListenerConfig {
                ip: addr.ip().to_string(),
                port: addr.port(),
            }];
        }
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_threads == 0 {
            bail!("worker_threads must be at least 1");
        }
        if self.proxy.max_response_body == 0 {
            bail!("proxy.max_response_body must be at least 1");
        }
        for listener in &self.listeners {
            listener.socket_addr()?;
        }
        Ok(())
    }
}
