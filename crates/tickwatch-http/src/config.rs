//! HTTP server configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bearer token for `/monitor/*` (empty = open).
    #[serde(default, skip_serializing)]
    pub api_token: String,
}

fn default_enabled() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            bind: default_bind(),
            port: default_port(),
            api_token: String::new(),
        }
    }
}

impl HttpConfig {
    pub fn auth_enabled(&self) -> bool {
        !self.api_token.trim().is_empty()
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
