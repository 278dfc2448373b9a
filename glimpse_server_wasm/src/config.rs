//! Server configuration
//!
//! Loaded from `GLIMPSE_`-prefixed environment variables (plus a `.env` file
//! when one is readable) using the `config` and `dotenvy` crates:
//!
//! - `GLIMPSE_ALLOWED_ORIGIN` -> `allowed_origin`
//! - `GLIMPSE_MAX_PAYLOAD_BYTES` -> `max_payload_bytes`
//! - `GLIMPSE_IDLE_TIMEOUT_SECS` -> `idle_timeout_secs`

use crate::error::{ConfigError, ValidationError};
use serde::Deserialize;
use wstd::http::HeaderValue;

const ENV_PREFIX: &str = "GLIMPSE";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Value of `access-control-allow-origin` on every response
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Bytes a mailbox may hold before further sends are refused
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: usize,

    /// Seconds without a poll or message before a connection is dropped
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Load and save a state snapshot around every request
    #[serde(default = "default_persist_state")]
    pub persist_state: bool,

    /// Where the snapshot lives when `persist_state` is set
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Log filter directive, used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

fn default_max_payload_bytes() -> usize {
    16 * 1024
}

fn default_max_buffered_bytes() -> usize {
    1024 * 1024
}

fn default_idle_timeout_secs() -> u64 {
    10
}

fn default_persist_state() -> bool {
    true
}

fn default_state_file() -> String {
    "glimpse_state.json".to_string()
}

fn default_log_filter() -> String {
    "info,glimpse_server_wasm=debug".to_string()
}

impl ServerConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value cannot be parsed or fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load configuration from an explicit set of variables instead of the
    /// process environment
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Result<Self, ConfigError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let vars: config::Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate server configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_payload_bytes == 0 {
            return Err(ValidationError::ZeroLimit("max_payload_bytes"));
        }
        if self.max_buffered_bytes == 0 {
            return Err(ValidationError::ZeroLimit("max_buffered_bytes"));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ValidationError::ZeroLimit("idle_timeout_secs"));
        }
        if self.persist_state && self.state_file.trim().is_empty() {
            return Err(ValidationError::MissingStateFile);
        }
        self.origin_header()?;
        Ok(())
    }

    /// The allowed origin as a header value
    pub fn origin_header(&self) -> Result<HeaderValue, ValidationError> {
        HeaderValue::from_str(&self.allowed_origin).map_err(|_| ValidationError::InvalidOrigin)
    }

    /// Idle timeout in milliseconds
    pub fn idle_timeout_ms(&self) -> u64 {
        self.idle_timeout_secs.saturating_mul(1000)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
            max_payload_bytes: default_max_payload_bytes(),
            max_buffered_bytes: default_max_buffered_bytes(),
            idle_timeout_secs: default_idle_timeout_secs(),
            persist_state: default_persist_state(),
            state_file: default_state_file(),
            log_filter: default_log_filter(),
        }
    }
}
