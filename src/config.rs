//! Connection configuration.
//!
//! All timeouts are in milliseconds so the struct can be loaded from any
//! serde format:
//!
//! ```
//! use iproto_client::ConnectionConfig;
//!
//! let config = ConnectionConfig::default();
//! assert_eq!(config.connect_timeout().as_millis(), 1000);
//! assert_eq!(config.read_timeout(), config.connect_timeout());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Default interval between liveness pings.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 5000;

/// Tunables for one [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Upper bound for one connect attempt; also the reconnect cadence.
    pub connect_timeout_ms: u64,
    /// Per-request deadline. Zero means "same as the connect timeout".
    pub read_timeout_ms: u64,
    /// Liveness ping interval; `None` disables pings.
    pub ping_interval_ms: Option<u64>,
    /// Largest inbound payload accepted before the connection is torn down.
    pub max_payload_size: u32,
    /// Set `TCP_NODELAY` on every new socket.
    pub nodelay: bool,
}

impl ConnectionConfig {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Effective per-request deadline.
    pub fn read_timeout(&self) -> Duration {
        match self.read_timeout_ms {
            0 => self.connect_timeout(),
            ms => Duration::from_millis(ms),
        }
    }

    /// Ping interval, if pings are enabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        self.ping_interval_ms.map(Duration::from_millis)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: 0,
            ping_interval_ms: Some(DEFAULT_PING_INTERVAL_MS),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            nodelay: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_timeout_falls_back_to_connect_timeout() {
        let config = ConnectionConfig {
            connect_timeout_ms: 250,
            read_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.read_timeout(), Duration::from_millis(250));

        let config = ConnectionConfig {
            read_timeout_ms: 40,
            ..config
        };
        assert_eq!(config.read_timeout(), Duration::from_millis(40));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"read_timeout_ms": 15, "ping_interval_ms": null}"#).unwrap();

        assert_eq!(config.read_timeout(), Duration::from_millis(15));
        assert_eq!(config.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);
        assert!(config.ping_interval().is_none());
        assert!(config.nodelay);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ConnectionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ConnectionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
