use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{RealtimeError, Result};

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:4000/realtime/v1/websocket";

/// Connection-level options for the realtime client.
///
/// These options control:
/// - Which endpoint the socket connects to
/// - Heartbeat interval
/// - Reconnect interval and attempt cap (fixed interval, no backoff)
/// - Verbose frame-level logging
///
/// Field names are snake_case; the camelCase spellings used by JavaScript
/// configuration files (`heartbeatIntervalMs`, ...) are accepted as aliases.
///
/// # Example
///
/// ```rust
/// use realtime_link::ClientOptions;
///
/// let options = ClientOptions::default()
///     .with_endpoint("wss://realtime.example.org/socket")
///     .with_heartbeat_interval_ms(15_000)
///     .with_reconnect_interval_ms(2_000)
///     .with_reconnect_max_attempts(5);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// WebSocket endpoint (`ws://`, `wss://`, `http://` or `https://`).
    /// Default: [`DEFAULT_ENDPOINT`]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Interval between system `ping` frames while connected.
    /// Set to `0` to disable the heartbeat. Default: 30000ms
    #[serde(default = "default_heartbeat_interval_ms", alias = "heartbeatIntervalMs")]
    pub heartbeat_interval_ms: u64,

    /// Fixed delay before each reconnect attempt after an unexpected close.
    /// Default: 5000ms
    #[serde(default = "default_reconnect_interval_ms", alias = "reconnectIntervalMs")]
    pub reconnect_interval_ms: u64,

    /// Reconnect attempts allowed before the client gives up until the next
    /// successful open. Set to `0` to disable automatic reconnection.
    /// Default: 10
    #[serde(default = "default_reconnect_max_attempts", alias = "reconnectMaxAttempts")]
    pub reconnect_max_attempts: u32,

    /// Maximum time allowed for one socket open (TCP + handshake).
    /// A timed-out open counts as a failed attempt. `0` waits indefinitely.
    /// Default: 10000ms
    #[serde(default = "default_connect_timeout_ms", alias = "connectTimeoutMs")]
    pub connect_timeout_ms: u64,

    /// Log every dropped send, malformed frame and unknown system event.
    /// Default: false
    #[serde(default)]
    pub debug: bool,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_interval_ms() -> u64 {
    5_000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            debug: false,
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the WebSocket endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the heartbeat interval in milliseconds (`0` disables pings).
    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    /// Set the fixed delay between reconnect attempts in milliseconds.
    pub fn with_reconnect_interval_ms(mut self, ms: u64) -> Self {
        self.reconnect_interval_ms = ms;
        self
    }

    /// Set the reconnect attempt cap (`0` disables automatic reconnection).
    pub fn with_reconnect_max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_max_attempts = attempts;
        self
    }

    /// Set the socket open timeout in milliseconds (`0` waits indefinitely).
    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    /// Enable verbose frame-level logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Heartbeat interval, or `None` when disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Connect timeout, or `None` when opens may take indefinitely.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    /// Check that the endpoint parses and uses a WebSocket-capable scheme.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(self.endpoint.trim())?;
        match url.scheme() {
            "ws" | "wss" | "http" | "https" => {},
            other => {
                return Err(RealtimeError::ConfigurationError(format!(
                    "Unsupported endpoint scheme '{}'; expected ws(s) or http(s)",
                    other
                )))
            },
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(RealtimeError::ConfigurationError(format!(
                "Endpoint '{}' has no host",
                self.endpoint
            )));
        }
        if self.reconnect_max_attempts > 0 && self.reconnect_interval_ms == 0 {
            return Err(RealtimeError::ConfigurationError(
                "reconnect_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
