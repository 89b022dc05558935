use std::path::Path;
use std::time::Duration;
use std::{fmt, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Durations travel as integer milliseconds in every config file.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// # Request Client Configuration
///
/// Governs the HTTP side: where requests go, how long they may take, how
/// often they may be retried and how many may be issued per window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Base URL relative endpoints are joined onto.
    pub base_url: String,
    /// Bearer credential attached as `Authorization`, when set.
    pub api_key: Option<String>,
    /// Per-request timeout.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Attempts made by `request_with_retry` before giving up.
    pub retry_attempts: u32,
    /// First retry delay; doubles every attempt.
    #[serde(with = "duration_ms")]
    pub retry_base_delay: Duration,
    /// Ceiling on any single retry delay.
    #[serde(with = "duration_ms")]
    pub retry_max_delay: Duration,
    /// Length of the sliding rate-limit window.
    #[serde(with = "duration_ms")]
    pub rate_limit_window: Duration,
    /// Requests admitted per window.
    pub max_requests_per_window: usize,
    /// Value of the `X-Client` header.
    pub client_name: String,
    /// Value of the `X-Client-Version` header.
    pub client_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(10),
            rate_limit_window: Duration::from_secs(60),
            max_requests_per_window: 100,
            client_name: "world-freight-dashboard".to_string(),
            client_version: "2.1.0".to_string(),
        }
    }
}

/// # Socket Client Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketConfig {
    /// `ws://` or `wss://` endpoint of the push feed.
    pub url: String,
    /// Sub-protocols offered during the handshake.
    pub protocols: Vec<String>,
    /// Reconnect automatically after the transport closes.
    pub auto_reconnect: bool,
    /// Reconnect delay unit; attempt `n` waits `n * reconnect_interval`.
    #[serde(with = "duration_ms")]
    pub reconnect_interval: Duration,
    /// Consecutive reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Keep-alive period while open; zero disables heartbeats.
    #[serde(with = "duration_ms")]
    pub heartbeat_interval: Duration,
    /// Decoded messages retained in the history ring.
    pub history_capacity: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            protocols: Vec::new(),
            auto_reconnect: true,
            reconnect_interval: Duration::from_secs(3),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
            history_capacity: 100,
        }
    }
}

/// # Sync Controller Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Period of the poll timer in poll mode.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Endpoint the HTTP snapshot source fetches.
    pub snapshot_endpoint: String,
    /// Alerts kept in state; older ones are dropped.
    pub max_alerts: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2500),
            snapshot_endpoint: "dashboard".to_string(),
            max_alerts: 50,
        }
    }
}

/// Everything the synchronisation layer needs, grouped per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// HTTP request client.
    pub client: ClientConfig,
    /// Push feed socket.
    pub socket: SocketConfig,
    /// Controller.
    pub sync: SyncConfig,
}

impl Settings {
    /// Reads settings from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the components cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.retryAttempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.client.max_requests_per_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.maxRequestsPerWindow",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sync.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "sync.pollInterval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.socket.history_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "socket.historyCapacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings
    Base URL: {},
    Credential: {},
    Timeout: {:?}, retries: {},
    Rate limit: {} per {:?},
    Socket URL: {},
    Heartbeat: {:?}, reconnect: {:?} x {},
    Poll interval: {:?}
",
            self.client.base_url,
            if self.client.api_key.is_some() { "set" } else { "none" },
            self.client.timeout,
            self.client.retry_attempts,
            self.client.max_requests_per_window,
            self.client.rate_limit_window,
            self.socket.url,
            self.socket.heartbeat_interval,
            self.socket.reconnect_interval,
            self.socket.max_reconnect_attempts,
            self.sync.poll_interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.client.timeout, Duration::from_secs(10));
        assert_eq!(s.client.retry_attempts, 3);
        assert_eq!(s.client.rate_limit_window, Duration::from_secs(60));
        assert_eq!(s.client.max_requests_per_window, 100);
        assert_eq!(s.sync.poll_interval, Duration::from_millis(2500));
        assert_eq!(s.socket.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(s.socket.reconnect_interval, Duration::from_secs(3));
        assert_eq!(s.socket.max_reconnect_attempts, 5);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "client": {{ "timeout": 2500, "apiKey": "k" }}, "sync": {{ "pollInterval": 1000 }} }}"#
        )
        .unwrap();

        let s = Settings::from_json_file(file.path()).unwrap();
        assert_eq!(s.client.timeout, Duration::from_millis(2500));
        assert_eq!(s.client.api_key.as_deref(), Some("k"));
        assert_eq!(s.client.retry_attempts, 3);
        assert_eq!(s.sync.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut s = Settings::default();
        s.sync.poll_interval = Duration::ZERO;
        assert!(matches!(s.validate(), Err(ConfigError::InvalidValue { .. })));
    }
}
