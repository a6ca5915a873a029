//! Client configuration.
//!
//! Values come from the environment (optionally seeded from `.env` files by the
//! binary) and fall back to the defaults the server was tuned for.

use std::time::Duration;

use crate::infrastructure::websocket::shared::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_MAX_MISSED_HEARTBEATS,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS,
};

/// Default real-time endpoint
pub const DEFAULT_WS_URL: &str = "ws://localhost:5000/ws";

/// Default REST base URL
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Retry parameters for the reconnection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
    /// Fixed wait between attempts
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

/// Liveness probe parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How long `ping()` waits for a `pong`
    pub timeout: Duration,
    /// Period of the background monitor; `None` disables it
    pub interval: Option<Duration>,
    /// Consecutive misses before `connection:unresponsive` is published
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            interval: Some(Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS)),
            max_missed: DEFAULT_MAX_MISSED_HEARTBEATS,
        }
    }
}

/// Everything the client needs, injected once at the composition root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub ws_url: String,
    pub api_url: String,
    pub reconnect: ReconnectConfig,
    pub heartbeat: HeartbeatConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// Unset variables use defaults; unparsable ones are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let ws_url = lookup("FUZZBOARD_WS_URL").unwrap_or(defaults.ws_url);
        let api_url = lookup("FUZZBOARD_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        let reconnect = ReconnectConfig {
            max_attempts: parse_or(
                &lookup,
                "FUZZBOARD_RECONNECT_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
            delay: Duration::from_millis(parse_or(
                &lookup,
                "FUZZBOARD_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )),
        };

        let interval_ms: u64 = parse_or(
            &lookup,
            "FUZZBOARD_HEARTBEAT_INTERVAL_MS",
            DEFAULT_HEARTBEAT_INTERVAL_MS,
        );
        let heartbeat = HeartbeatConfig {
            timeout: Duration::from_millis(parse_or(
                &lookup,
                "FUZZBOARD_HEARTBEAT_TIMEOUT_MS",
                DEFAULT_HEARTBEAT_TIMEOUT_MS,
            )),
            interval: (interval_ms > 0).then(|| Duration::from_millis(interval_ms)),
            max_missed: parse_or(
                &lookup,
                "FUZZBOARD_MAX_MISSED_HEARTBEATS",
                defaults.heartbeat.max_missed,
            ),
        };

        Self {
            ws_url,
            api_url,
            reconnect,
            heartbeat,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, fallback = %default, "Ignoring unparsable setting");
            default
        }),
    }
}

/// Per-call overrides for `RealtimeClient::connect_with`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_delay: Option<Duration>,
}

impl ConnectOptions {
    pub fn apply(&self, base: ReconnectConfig) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: self.max_reconnect_attempts.unwrap_or(base.max_attempts),
            delay: self.reconnect_delay.unwrap_or(base.delay),
        }
    }
}
