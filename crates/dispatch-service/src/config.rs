//! Dispatch Service configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; a value that is present but cannot be parsed is an error rather
//! than a silent fallback.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default WebSocket and user API bind address.
pub const DEFAULT_WS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default cap on attached sockets.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Default per-connection outbound mailbox size.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 200;

/// Default wait after cancellation before the process exits.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 5;

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "ds";

/// Dispatch Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket and user API bind address (default: "0.0.0.0:8080").
    pub ws_bind_address: String,

    /// Health and metrics bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this instance.
    pub instance_id: String,

    /// Maximum number of attached sockets.
    pub max_connections: usize,

    /// Outbound mailbox size per connection.
    pub outbound_buffer: usize,

    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_grace_seconds: u64,

    /// Emit logs as JSON.
    pub log_json: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let ws_bind_address = vars
            .get("DISPATCH_WS_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WS_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("DISPATCH_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let max_connections =
            parse_var(vars, "DISPATCH_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "DISPATCH_MAX_CONNECTIONS must be greater than zero".to_string(),
            ));
        }

        let outbound_buffer =
            parse_var(vars, "DISPATCH_OUTBOUND_BUFFER", DEFAULT_OUTBOUND_BUFFER)?;
        if outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "DISPATCH_OUTBOUND_BUFFER must be greater than zero".to_string(),
            ));
        }

        let shutdown_grace_seconds = parse_var(
            vars,
            "DISPATCH_SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
        )?;

        let log_json = parse_var(vars, "DISPATCH_LOG_JSON", false)?;

        // Generate instance ID
        let instance_id = vars.get("DISPATCH_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            ws_bind_address,
            health_bind_address,
            instance_id,
            max_connections,
            outbound_buffer,
            shutdown_grace_seconds,
            log_json,
        })
    }
}

/// Parse an optional variable, falling back to `default` only when absent.
fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}
