//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - Builder-style overrides in code

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FramewireError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Protocol limits enforced per session
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Object pool sizing
    #[serde(default)]
    pub pools: PoolConfig,

    /// Listener configuration (used by the demo server binary)
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FramewireError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| FramewireError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FRAMEWIRE_MAX_HEADER_LEN") {
            if let Ok(val) = val.parse() {
                config.limits.max_header_len = val;
            }
        }
        if let Ok(val) = std::env::var("FRAMEWIRE_MAX_MESSAGE_SIZE") {
            if let Ok(val) = val.parse() {
                config.limits.max_message_size = val;
            }
        }
        if let Ok(val) = std::env::var("FRAMEWIRE_MAX_TRANSMISSION_ERRORS") {
            if let Ok(val) = val.parse() {
                config.limits.max_transmission_errors = val;
            }
        }
        if let Ok(val) = std::env::var("FRAMEWIRE_IDLE_TIMEOUT_SECS") {
            if let Ok(val) = val.parse() {
                config.limits.idle_timeout_secs = val;
            }
        }
        if let Ok(host) = std::env::var("FRAMEWIRE_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("FRAMEWIRE_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }

        config
    }
}

/// Protocol limits enforced per session.
///
/// Both maximums are fatal-on-violation: a header block that exceeds
/// `max_header_len` without terminating, or a declared content length above
/// `max_message_size`, terminates the offending session immediately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum length of a header block, in bytes, including the terminator
    pub max_header_len: usize,

    /// Maximum declared content length for a single message body, in bytes
    pub max_message_size: usize,

    /// Consecutive decode failures tolerated before a session is evicted
    pub max_transmission_errors: u32,

    /// Seconds without a valid message before the watchdog evicts a session
    pub idle_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_len: 8 * 1024,
            max_message_size: 128 * 1024,
            max_transmission_errors: 3,
            idle_timeout_secs: 600,
        }
    }
}

impl LimitsConfig {
    /// Idle window as a [`Duration`]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Override the maximum message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Override the maximum header length
    pub fn with_max_header_len(mut self, len: usize) -> Self {
        self.max_header_len = len;
        self
    }

    /// Override the bad-transmission ceiling
    pub fn with_max_transmission_errors(mut self, errors: u32) -> Self {
        self.max_transmission_errors = errors;
        self
    }

    /// Override the idle window
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_secs = timeout.as_secs();
        self
    }
}

/// Object pool sizing.
///
/// The request pool is session-scoped; the outgoing-buffer pool is shared
/// server-wide. Sizing here is policy, not contract: the engine only
/// requires that every acquire is matched by a release.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pooled request wrappers pre-instantiated per session
    pub request_pool_initial: usize,

    /// Hard cap on pooled request wrappers per session
    pub request_pool_max: usize,

    /// Outgoing byte buffers pre-instantiated server-wide
    pub buffer_pool_initial: usize,

    /// Hard cap on outgoing byte buffers server-wide
    pub buffer_pool_max: usize,

    /// Capacity of each pooled outgoing buffer, in bytes
    pub buffer_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            request_pool_initial: 2,
            request_pool_max: 4,
            buffer_pool_initial: 4,
            buffer_pool_max: 64,
            buffer_capacity: 144 * 1024,
        }
    }
}

/// Listener configuration for the demo server binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Seconds between idle-watchdog sweeps
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7313,
            sweep_interval_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
