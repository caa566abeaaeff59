//! Distributed cache configuration

use crate::error::{DistributedError, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

/// Default frame limit (64 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Where the shared cache lives and how to authenticate to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedConfig {
    /// Host name or IP of the cache address
    pub host: String,
    /// TCP port of the cache address
    pub port: u16,
    /// Shared secret; all nodes of one cache must agree
    pub secret: String,
    /// Largest frame accepted from a peer
    pub max_frame_bytes: usize,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 50000,
            secret: String::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl DistributedConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve to the single socket address used for both bind and connect.
    ///
    /// Only the first resolved address is used, so a name resolving to
    /// several families can never yield two hosts.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| DistributedError::InvalidAddress(format!("{}: {}", self.address(), e)))?
            .next()
            .ok_or_else(|| DistributedError::InvalidAddress(self.address()))
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
