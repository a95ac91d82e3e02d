use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    pub position_poll_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            position_poll_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub kind: String,
    /// Used by the simulated device when a source carries no duration hint.
    pub default_duration_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: "simulated".to_string(),
            default_duration_ms: 180_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub catalog_base_url: String,
    pub request_timeout_ms: u64,
    pub favorites_path: Option<PathBuf>,
    pub log_level: String,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            catalog_base_url: "http://localhost:8080/".to_string(),
            request_timeout_ms: 10_000,
            favorites_path: None,
            log_level: "info".to_string(),
            playback: PlaybackConfig::default(),
            device: DeviceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    #[test]
    fn partial_toml_falls_back_to_section_defaults() {
        let raw = r#"
catalog_base_url = "http://10.0.2.2:8080/"
request_timeout_ms = 5000
log_level = "debug"
"#;
        let cfg: AppConfig = toml::from_str(raw).unwrap();

        assert_eq!(cfg.schema_version, 1);
        assert_eq!(cfg.playback.position_poll_ms, 1_000);
        assert_eq!(cfg.device.kind, "simulated");
        assert!(cfg.favorites_path.is_none());
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let back: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.catalog_base_url, "http://localhost:8080/");
    }
}
