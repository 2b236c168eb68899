use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::serde_secs;

/// Wire protocol an engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// A registered workflow engine. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,

    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub protocol: Protocol,

    /// Path answered by `GET` when the engine is live
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Path that accepts engine invocations
    #[serde(default = "default_invoke_path")]
    pub invoke_path: String,

    /// Per-call timeout; a workflow step may override it
    #[serde(default = "default_timeout", with = "serde_secs")]
    pub timeout: Duration,

    /// Critical endpoints raise alerts when they go down
    #[serde(default)]
    pub critical: bool,
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_invoke_path() -> String {
    "/invoke".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Endpoint {
    /// Create an endpoint with default paths, protocol and timeout.
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            protocol: Protocol::default(),
            health_path: default_health_path(),
            invoke_path: default_invoke_path(),
            timeout: default_timeout(),
            critical: false,
        }
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }

    pub fn health_url(&self) -> String {
        join_url(&self.base_url(), &self.health_path)
    }

    pub fn invoke_url(&self) -> String {
        join_url(&self.base_url(), &self.invoke_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
