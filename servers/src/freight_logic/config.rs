use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use lib_freight::configs::Settings;
use lib_freight::core::SyncMode;
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "server_freight.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "World Freight dashboard sync server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "FREIGHT_PORT", help = "Port to listen on for dashboard clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "FREIGHT_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FREIGHT_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FREIGHT_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FREIGHT_MODE", help = "Initial sync mode: push or poll.")]
    pub mode: Option<String>,

    #[clap(long, env = "FREIGHT_API_URL", help = "Base URL of the dashboard REST API.")]
    pub api_base_url: Option<String>,

    #[clap(long, env = "FREIGHT_API_KEY", help = "Bearer credential for the REST APIs.")]
    pub api_key: Option<String>,

    #[clap(long, env = "FREIGHT_CLASSIFIER_URL", help = "Base URL of the classification service.")]
    pub classifier_base_url: Option<String>,

    #[clap(long, env = "FREIGHT_WS_URL", help = "WebSocket URL of the push feed.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "FREIGHT_POLL_INTERVAL_MS", help = "Snapshot interval in poll mode.")]
    pub poll_interval_ms: Option<u64>,

    #[clap(long, env = "FREIGHT_MAX_REQUESTS", help = "Requests admitted per rate-limit window.")]
    pub max_requests_per_window: Option<usize>,

    /// Component settings; only settable from the config file.
    #[clap(skip)]
    pub settings: Option<Settings>,
}

impl Config {
    // 'other' wins wherever it has a value
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            mode: other.mode.or(self.mode),
            api_base_url: other.api_base_url.or(self.api_base_url),
            api_key: other.api_key.or(self.api_key),
            classifier_base_url: other.classifier_base_url.or(self.classifier_base_url),
            ws_url: other.ws_url.or(self.ws_url),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            max_requests_per_window: other.max_requests_per_window.or(self.max_requests_per_window),
            settings: other.settings.or(self.settings),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(9003)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn sync_mode(&self) -> Result<SyncMode> {
        match self.mode.as_deref().map(str::trim) {
            None | Some("push") => Ok(SyncMode::Push),
            Some("poll") => Ok(SyncMode::Poll),
            Some(other) => bail!("Unknown sync mode '{}' (expected push or poll)", other),
        }
    }

    /// Component settings from the file, with the flat overrides applied on top.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = self.settings.clone().unwrap_or_default();
        if let Some(url) = &self.api_base_url {
            settings.client.base_url = url.clone();
        }
        if let Some(key) = &self.api_key {
            settings.client.api_key = Some(key.clone());
        }
        if let Some(url) = &self.ws_url {
            settings.socket.url = url.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.sync.poll_interval = std::time::Duration::from_millis(ms);
        }
        if let Some(max) = self.max_requests_per_window {
            settings.client.max_requests_per_window = max;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// The classification service defaults to `classifier/` under the API.
    pub fn classifier_base_url(&self, settings: &Settings) -> String {
        match &self.classifier_base_url {
            Some(url) => url.clone(),
            None => format!("{}/classifier/", settings.client.base_url.trim_end_matches('/')),
        }
    }
}

/// Defaults, then the JSON config file, then environment and CLI.
pub fn load_config(cli: Config) -> Result<Config> {
    let defaults = Config {
        port: Some(9003),
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        mode: Some("push".to_string()),
        ..Default::default()
    };

    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let current = match read_config_file(&config_file_path)? {
        Some(file_config) => defaults.merge(file_config),
        None => defaults,
    };

    Ok(current.merge(cli))
}

fn read_config_file(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn missing_file() -> Config {
        Config {
            config_path: Some(PathBuf::from("/nonexistent/server_freight.conf")),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let config = load_config(missing_file()).unwrap();
        assert_eq!(config.port(), 9003);
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.sync_mode().unwrap(), SyncMode::Push);
    }

    #[test]
    fn cli_overrides_file_which_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_freight.conf");
        fs::write(
            &path,
            r#"{
                "port": 9100,
                "logLevel": "debug",
                "mode": "poll",
                "settings": { "sync": { "pollInterval": 1000 }, "client": { "retryAttempts": 5 } }
            }"#,
        )
        .unwrap();

        let cli = Config {
            config_path: Some(path),
            port: Some(9200),
            ..Default::default()
        };
        let config = load_config(cli).unwrap();
        assert_eq!(config.port(), 9200);
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.sync_mode().unwrap(), SyncMode::Poll);
        assert_eq!(config.settings().unwrap().client.retry_attempts, 5);
    }

    #[test]
    fn broken_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_freight.conf");
        fs::write(&path, "{ not json").unwrap();
        let cli = Config {
            config_path: Some(path),
            ..Default::default()
        };
        assert!(load_config(cli).is_err());
    }

    #[test]
    fn flat_flags_reach_component_settings() {
        let config = Config {
            api_base_url: Some("http://api.local/v2/".to_string()),
            ws_url: Some("ws://feed.local/ws".to_string()),
            poll_interval_ms: Some(500),
            ..missing_file()
        };
        let settings = config.settings().unwrap();
        assert_eq!(settings.client.base_url, "http://api.local/v2/");
        assert_eq!(settings.socket.url, "ws://feed.local/ws");
        assert_eq!(settings.sync.poll_interval, Duration::from_millis(500));
        assert_eq!(
            config.classifier_base_url(&settings),
            "http://api.local/v2/classifier/"
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = Config {
            poll_interval_ms: Some(0),
            ..Default::default()
        };
        assert!(config.settings().is_err());
        let config = Config {
            mode: Some("stream".to_string()),
            ..Default::default()
        };
        assert!(config.sync_mode().is_err());
    }
}
