use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

/// WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    /// Per-client outbound queue depth.
    pub max_send_queue: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a client is considered dead.
    pub client_timeout_secs: u64,
    /// Seconds between dead-client sweeps.
    pub cleanup_interval_secs: u64,
    /// Capacity of the coordinator's outbound event channel.
    pub event_buffer_size: usize,
    /// Allowed CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
            event_buffer_size: 1024,
            allowed_origins: Vec::new(),
        }
    }
}

/// Catalog persistence backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(SettingsError::InvalidValue(format!(
                "unknown store backend: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Path of the catalog file (JSON) or database (SQLite).
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json,
            path: "tvshows.json".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("JSON".parse::<StoreBackend>().unwrap(), StoreBackend::Json);
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn settings_serialize_camel_case() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["server"]["maxSendQueue"], 256);
        assert_eq!(json["server"]["heartbeatIntervalSecs"], 30);
        assert_eq!(json["store"]["backend"], "json");
    }
}
