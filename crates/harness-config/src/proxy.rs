//! Configuration document for the proxy under test.
//!
//! Scenarios build one of these, write it to a temp file and hand the path
//! to the proxy with `-c <path>`. The shape mirrors what the proxy parses;
//! optional fields are omitted from the JSON entirely rather than written
//! as null.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Plaintext listener port.
    pub port: u16,
    /// TLS listener port, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<u16>,
    /// MIME types eligible for on-the-fly compression.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gzip_mime_types: Vec<String>,
    /// Routing table. A config without a `proxies` key is how "no routes"
    /// is expressed to the proxy (it then answers 404).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Vec<ProxyRoute>>,
}

/// One routing entry: which hosts map to which backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub hosts: Vec<String>,
    pub ip: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_passthrough: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_ssl: Option<bool>,
}

impl ProxyRoute {
    /// Route for `localhost` to a loopback backend port.
    pub fn localhost(port: u16) -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            ip: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, certificate_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        self.certificate_path = Some(certificate_path.into());
        self.key_path = Some(key_path.into());
        self
    }
}

/// Write the config as pretty-printed JSON, the way the proxy reads it.
pub async fn write_config(path: &Path, config: &ProxyConfig) -> io::Result<()> {
    let body = serde_json::to_string_pretty(config).map_err(io::Error::other)?;
    tokio::fs::write(path, body).await
}
