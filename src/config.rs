//! Configuration for nairkv
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{NairError, Result};

/// Port used when a host entry omits one
pub const DEFAULT_PORT: u16 = 8887;

/// Main configuration for a nairkv client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Endpoint Configuration
    // -------------------------------------------------------------------------
    /// Server endpoints, `host:port` or bare `host`
    pub hosts: Vec<String>,

    /// Port applied to bare hosts
    pub default_port: u16,

    // -------------------------------------------------------------------------
    // Request Configuration
    // -------------------------------------------------------------------------
    /// Age after which a pending request is evicted (milliseconds).
    /// Also the period of the timeout sweep.
    pub request_timeout_ms: u64,

    /// Upper bound on a single connect attempt (milliseconds)
    pub connect_timeout_ms: u64,

    /// Largest payload accepted in a single frame (in bytes)
    pub max_payload_size: u32,

    /// TTL applied by the client when a write does not name one (seconds)
    pub default_ttl_secs: u32,

    // -------------------------------------------------------------------------
    // Reconnect Configuration
    // -------------------------------------------------------------------------
    /// Delay seed for the first reconnect (milliseconds)
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the delay after every failure
    pub backoff_factor: f64,

    /// Cap on the reconnect delay (milliseconds)
    pub max_backoff_ms: u64,

    /// Stop reconnecting after this many consecutive attempts.
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------
    /// Emit per-request and per-frame debug logs
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            default_port: DEFAULT_PORT,
            request_timeout_ms: 5000,
            connect_timeout_ms: 5000,
            max_payload_size: 16 * 1024 * 1024, // 16 MB
            default_ttl_secs: 60 * 60 * 24,
            initial_backoff_ms: 150,
            backoff_factor: 1.7,
            max_backoff_ms: 30_000,
            max_reconnect_attempts: None,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check the settings that would otherwise surface as odd runtime behavior
    pub fn validate(&self) -> Result<()> {
        if self.hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(NairError::Config("at least one host is required".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(NairError::Config("request_timeout_ms must be positive".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(NairError::Config("connect_timeout_ms must be positive".to_string()));
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(NairError::Config(format!(
                "backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(NairError::Config(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Add a single endpoint
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.hosts.push(host.into());
        self
    }

    /// Replace the endpoint list
    pub fn hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_port(mut self, port: u16) -> Self {
        self.config.default_port = port;
        self
    }

    /// Set the request timeout (in milliseconds)
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the maximum frame payload (in bytes)
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    pub fn default_ttl_secs(mut self, secs: u32) -> Self {
        self.config.default_ttl_secs = secs;
        self
    }

    /// Set the reconnect delay seed (in milliseconds)
    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.config.initial_backoff_ms = ms;
        self
    }

    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    /// Set the reconnect delay cap (in milliseconds)
    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
