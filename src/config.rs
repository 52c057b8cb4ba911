//! Configuration file management for mtlsprobe.
//!
//! This module handles loading, parsing, and merging configuration from TOML files
//! and command-line arguments.
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (specified with --config)
//! 3. Command-line arguments (highest priority)
//!
//! The defaults reproduce the fixed layout the probe was built around: PEM
//! files under `./cert/` and a server on `https://localhost:8443/`.
//!
//! # Example Configuration File
//!
//! ```toml
//! url = "https://localhost:8443/"
//! client_cert = "./cert/client-cert.pem"
//! client_key = "./cert/client-key.pem"
//! root_ca = "./cert/root-ca.pem"
//! server_cert = "./cert/server-cert.pem"
//! interval_secs = 60
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::identity::TlsIdentity;

pub const DEFAULT_URL: &str = "https://localhost:8443/";
pub const DEFAULT_CLIENT_CERT: &str = "./cert/client-cert.pem";
pub const DEFAULT_CLIENT_KEY: &str = "./cert/client-key.pem";
pub const DEFAULT_ROOT_CA: &str = "./cert/root-ca.pem";
pub const DEFAULT_SERVER_CERT: &str = "./cert/server-cert.pem";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_PROMETHEUS_ADDRESS: &str = "http://localhost:9091";

/// Main configuration structure for mtlsprobe.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values will be filled in by defaults or overridden by CLI arguments.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// HTTPS endpoint polled every cycle
    pub url: Option<String>,
    /// Client certificate presented to the server
    pub client_cert: Option<PathBuf>,
    /// Private key of the client certificate
    pub client_key: Option<PathBuf>,
    /// CA bundle the server certificate must chain to
    pub root_ca: Option<PathBuf>,
    /// Local copy of the server certificate, read for its expiry only
    pub server_cert: Option<PathBuf>,
    /// Seconds to wait between two successful polls
    pub interval_secs: Option<u64>,
    /// Request timeout in seconds; unset means requests may block forever
    pub request_timeout_secs: Option<u64>,
    /// Stop after this many cycles; unset means poll until a failure
    pub max_cycles: Option<u64>,
    /// Exit code to use when polling stops on a failed request
    pub exit_code: Option<i32>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus integration configuration.
///
/// Controls whether poll results are pushed to a Prometheus Push Gateway
/// and specifies the gateway address.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrometheusConfig {
    /// Enable prometheus metrics pushing
    pub enabled: Option<bool>,
    /// Prometheus push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

/// Fully resolved and validated settings the probe runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub url: Url,
    pub identity: TlsIdentity,
    pub server_cert: PathBuf,
    pub interval: Duration,
    pub request_timeout: Option<Duration>,
    pub max_cycles: Option<u64>,
    pub exit_code: i32,
    /// Push gateway address, present only when pushing is enabled
    pub prometheus_address: Option<String>,
}

impl Default for Config {
    /// Creates a configuration holding the built-in defaults.
    ///
    /// # Default Values
    ///
    /// - `url`: "https://localhost:8443/"
    /// - `client_cert`, `client_key`, `root_ca`, `server_cert`: files under `./cert/`
    /// - `interval_secs`: 60
    /// - `request_timeout_secs`: None (no timeout)
    /// - `max_cycles`: None (poll until a failure)
    /// - `exit_code`: 0
    /// - `prometheus.enabled`: false
    /// - `prometheus.address`: "http://localhost:9091"
    fn default() -> Self {
        Config {
            url: Some(DEFAULT_URL.to_string()),
            client_cert: Some(PathBuf::from(DEFAULT_CLIENT_CERT)),
            client_key: Some(PathBuf::from(DEFAULT_CLIENT_KEY)),
            root_ca: Some(PathBuf::from(DEFAULT_ROOT_CA)),
            server_cert: Some(PathBuf::from(DEFAULT_SERVER_CERT)),
            interval_secs: Some(DEFAULT_INTERVAL_SECS),
            request_timeout_secs: None,
            max_cycles: None,
            exit_code: Some(0),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some(DEFAULT_PROMETHEUS_ADDRESS.to_string()),
            }),
        }
    }
}

impl Config {
    /// A configuration with every field unset, used as the base for CLI overrides.
    pub fn empty() -> Self {
        Config {
            url: None,
            client_cert: None,
            client_key: None,
            root_ca: None,
            server_cert: None,
            interval_secs: None,
            request_timeout_secs: None,
            max_cycles: None,
            exit_code: None,
            prometheus: None,
        }
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use mtlsprobe::config::Config;
    /// let config = Config::from_file("mtlsprobe.toml")?;
    /// # Ok::<(), mtlsprobe::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value. If the `other` value is None, keeps the current value.
    ///
    /// # Example
    ///
    /// ```
    /// # use mtlsprobe::config::Config;
    /// let mut cli = Config::empty();
    /// cli.interval_secs = Some(5);
    /// let merged = Config::default().merge_with(cli);
    /// assert_eq!(merged.interval_secs, Some(5));
    /// ```
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.client_cert.is_some() {
            self.client_cert = other.client_cert;
        }
        if other.client_key.is_some() {
            self.client_key = other.client_key;
        }
        if other.root_ca.is_some() {
            self.root_ca = other.root_ca;
        }
        if other.server_cert.is_some() {
            self.server_cert = other.server_cert;
        }
        if other.interval_secs.is_some() {
            self.interval_secs = other.interval_secs;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.max_cycles.is_some() {
            self.max_cycles = other.max_cycles;
        }
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Validates the merged configuration and turns it into [`Settings`].
    ///
    /// Unset fields fall back to the built-in defaults, so a partially
    /// filled configuration resolves the same way as one merged onto
    /// [`Config::default`].
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let config = Config::default().merge_with(self);

        let raw_url = config.url.unwrap_or_else(|| DEFAULT_URL.to_string());
        let url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::Validation(format!("url '{}': {}", raw_url, e)))?;
        if url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "url '{}': scheme must be https",
                raw_url
            )));
        }

        let interval_secs = config.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(ConfigError::Validation(
                "interval_secs must be greater than 0".to_string(),
            ));
        }
        if config.request_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if config.max_cycles == Some(0) {
            return Err(ConfigError::Validation(
                "max_cycles must be greater than 0".to_string(),
            ));
        }

        let prometheus_address = match config.prometheus {
            Some(PrometheusConfig {
                enabled: Some(true),
                address,
            }) => Some(address.unwrap_or_else(|| DEFAULT_PROMETHEUS_ADDRESS.to_string())),
            _ => None,
        };

        Ok(Settings {
            url,
            identity: TlsIdentity::new(
                config
                    .client_cert
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_CERT)),
                config
                    .client_key
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_KEY)),
                config
                    .root_ca
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT_CA)),
            ),
            server_cert: config
                .server_cert
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVER_CERT)),
            interval: Duration::from_secs(interval_secs),
            request_timeout: config.request_timeout_secs.map(Duration::from_secs),
            max_cycles: config.max_cycles,
            exit_code: config.exit_code.unwrap_or(0),
            prometheus_address,
        })
    }

    /// Generates an example configuration file in TOML format.
    ///
    /// Creates a sample configuration with all available options set to
    /// example values. Useful for bootstrapping a new configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// # use mtlsprobe::config::Config;
    /// let example = Config::example_toml();
    /// assert!(example.contains("interval_secs"));
    /// ```
    pub fn example_toml() -> String {
        let example = Config {
            request_timeout_secs: Some(30),
            max_cycles: Some(1440),
            exit_code: Some(1),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some(DEFAULT_PROMETHEUS_ADDRESS.to_string()),
            }),
            ..Config::default()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (bad URL, zero interval, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
