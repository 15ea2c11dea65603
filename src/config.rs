// src/config.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 60001;

const ENV_BIND_HOST: &str = "REMOTE_CHART_BIND_HOST";
const ENV_HOST: &str = "REMOTE_CHART_HOST";
const ENV_PORT: &str = "REMOTE_CHART_PORT";
const ENV_INTERVAL_MS: &str = "REMOTE_CHART_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String, // Default: "*" (all interfaces)
    pub port: u16,    // Default: 60001
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "*".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = ServerConfig::default();
        if let Some(host) = env_string(ENV_BIND_HOST) {
            config.host = host;
        }
        if let Some(port) = env_parsed(ENV_PORT) {
            config.port = port;
        }
        config
    }

    /// Address handed to the listener. `*` is the wildcard address.
    pub fn bind_addr(&self) -> String {
        let host = match self.host.as_str() {
            "*" | "" => "0.0.0.0",
            other => other,
        };
        join_host_port(host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String, // Default: "127.0.0.1"
    pub port: u16,    // Default: 60001
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let mut config = ClientConfig::default();
        if let Some(host) = env_string(ENV_HOST) {
            config.host = host;
        }
        if let Some(port) = env_parsed(ENV_PORT) {
            config.port = port;
        }
        config
    }

    pub fn connect_addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub interval_ms: u64, // Default: 100
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig { interval_ms: 100 }
    }
}

impl CollectorConfig {
    pub fn from_env() -> Self {
        let mut config = CollectorConfig::default();
        if let Some(interval_ms) = env_parsed(ENV_INTERVAL_MS) {
            config.interval_ms = interval_ms;
        }
        config
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// IPv6 literals need brackets before a port can follow them.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}
