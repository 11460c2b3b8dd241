//! Configuration management

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server information and buffer sizes
    pub server: ServerConfig,
    /// Listening socket
    pub bind: BindConfig,
    /// Ping/pong keepalive and loop timing
    pub liveness: LivenessConfig,
    /// Reverse DNS for client hostnames
    pub lookup: LookupConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name, used as reply prefix and PING token
    pub name: String,
    /// Server version
    pub version: String,
    /// Bytes read from a socket per chunk
    pub recv_buffer: usize,
    /// Maximum bytes queued for a client before lines are dropped
    pub sendq: usize,
    /// Maximum bytes of an unterminated line held per client
    pub recvq: usize,
    /// Maximum nickname length
    pub max_nickname_length: usize,
}

/// Listening socket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BindConfig {
    /// Bind address
    pub address: String,
    /// Bind port
    pub port: u16,
}

/// Liveness and scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Interval between liveness sweeps (milliseconds)
    pub sweep_interval_ms: u64,
    /// Seconds between PINGs; an unanswered PING older than this closes the link
    pub ping_frequency: u64,
    /// Seconds an unregistered connection may stay open
    pub registration_timeout: u64,
    /// Idle pause between loop iterations (milliseconds)
    pub tick_interval_ms: u64,
}

/// Hostname lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Resolve client addresses to hostnames
    pub reverse_dns: bool,
    /// Seconds to wait for a single lookup
    pub timeout: u64,
    /// Seconds a resolved hostname stays cached
    pub cache_ttl: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            recv_buffer: 4096,
            sendq: 256 * 1024,
            recvq: 8192,
            max_nickname_length: 9,
        }
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 6667,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            ping_frequency: 60,
            registration_timeout: 60,
            tick_interval_ms: 10,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            reverse_dns: true,
            timeout: 5,
            cache_ttl: 300,
        }
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

impl LivenessConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn ping_frequency(&self) -> Duration {
        Duration::from_secs(self.ping_frequency)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Socket address string the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind.address, self.bind.port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.name.is_empty() {
            return Err(Error::Config("Server name cannot be empty".to_string()));
        }

        if self.server.name.contains(' ') {
            return Err(Error::Config("Server name cannot contain spaces".to_string()));
        }

        if self.server.recv_buffer == 0 {
            return Err(Error::Config("recv_buffer must be greater than 0".to_string()));
        }

        if self.server.sendq == 0 {
            return Err(Error::Config("sendq must be greater than 0".to_string()));
        }

        if self.server.recvq < self.server.recv_buffer {
            return Err(Error::Config(format!(
                "recvq ({}) cannot be smaller than recv_buffer ({})",
                self.server.recvq, self.server.recv_buffer
            )));
        }

        if self.server.max_nickname_length == 0 {
            return Err(Error::Config("Max nickname length must be greater than 0".to_string()));
        }

        if self.bind.address.parse::<IpAddr>().is_err() {
            return Err(Error::Config(format!("Invalid bind address: {}", self.bind.address)));
        }

        let liveness = &self.liveness;
        if liveness.sweep_interval_ms == 0 || liveness.tick_interval_ms == 0 {
            return Err(Error::Config("Loop intervals must be greater than 0".to_string()));
        }

        if liveness.ping_frequency == 0 || liveness.registration_timeout == 0 {
            return Err(Error::Config("Liveness timeouts must be greater than 0".to_string()));
        }

        if self.lookup.reverse_dns && self.lookup.timeout == 0 {
            return Err(Error::Config("Lookup timeout must be greater than 0".to_string()));
        }

        Ok(())
    }
}
