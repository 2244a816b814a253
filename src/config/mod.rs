//! Configuration management

use crate::netx::Netx;
use crate::tlsx::{configure_tls_version, TlsConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network primitives configuration
    #[serde(default)]
    pub netx: NetxConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::Error::Config(format!("Failed to write config: {}", e)))
    }
}

/// Timeouts and policies of the network primitives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetxConfig {
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Name resolution timeout in seconds (0 = bounded by the context only)
    pub resolve_timeout_secs: u64,
    /// TLS handshake timeout in seconds (0 = default of 10 seconds)
    pub tls_handshake_timeout_secs: u64,
    /// Pin both minimum and maximum TLS version ("TLSv1.3", "TLSv1.2", ...)
    pub tls_version: String,
    /// Fail resolutions that return bogon addresses
    pub reject_bogons: bool,
}

impl Default for NetxConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            resolve_timeout_secs: 15,
            tls_handshake_timeout_secs: 10,
            tls_version: String::new(),
            reject_bogons: false,
        }
    }
}

impl NetxConfig {
    /// Build the factory of network primitives described by this config
    pub fn build(&self) -> Netx {
        Netx::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .resolve_timeout(Duration::from_secs(self.resolve_timeout_secs))
            .tls_handshake_timeout(Duration::from_secs(self.tls_handshake_timeout_secs))
            .reject_bogons(self.reject_bogons)
            .build()
    }

    /// Base TLS configuration with the configured version applied
    pub fn tls_config(&self) -> Result<TlsConfig, crate::Error> {
        let mut config = TlsConfig::default();
        configure_tls_version(&mut config, &self.tls_version)?;
        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    Config {
        netx: NetxConfig {
            tls_version: "TLSv1.3".to_string(),
            ..NetxConfig::default()
        },
        logging: LoggingConfig::default(),
    }
}
