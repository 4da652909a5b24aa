//! Configuration for the motion notification pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name used for the config directory.
const APP_DIR: &str = "motion-notify";

/// Main configuration for the pipeline and the broadcast hub.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Time-series store the windows are read from
    pub source: SourceConfig,
    /// Model and label set
    pub model: ModelConfig,
    /// Detection gating
    pub debounce: DebounceConfig,
    /// Broadcast hub listener
    pub hub: HubConfig,
    /// Delivery of detections to the hub
    pub notifier: NotifierConfig,
    /// Driver loop pacing
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Check values that would otherwise only fail deep inside the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.window_samples == 0 {
            return Err(ConfigError::Invalid(
                "model.window_samples must be at least 1".to_string(),
            ));
        }
        if self.model.labels.is_empty() {
            return Err(ConfigError::Invalid("model.labels must not be empty".to_string()));
        }
        if self.model.target_label >= self.model.labels.len() {
            return Err(ConfigError::Invalid(format!(
                "model.target_label {} is out of range for {} labels",
                self.model.target_label,
                self.model.labels.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.debounce.threshold) {
            return Err(ConfigError::Invalid(format!(
                "debounce.threshold {} must be within [0, 1]",
                self.debounce.threshold
            )));
        }
        if self.source.fields.len() != crate::core::AXES {
            return Err(ConfigError::Invalid(format!(
                "source.fields must name exactly {} axes",
                crate::core::AXES
            )));
        }
        if self.hub.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid(
                "hub.subscriber_buffer must be at least 1".to_string(),
            ));
        }
        // An in-process dispatch wraps a whole broadcast, which may spend up
        // to one send timeout on a slow subscriber before pruning it.
        if self.notifier.timeout <= self.hub.send_timeout {
            return Err(ConfigError::Invalid(format!(
                "notifier.timeout ({:?}) must exceed hub.send_timeout ({:?})",
                self.notifier.timeout, self.hub.send_timeout
            )));
        }
        Ok(())
    }
}

/// InfluxDB connection and query shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the InfluxDB HTTP API
    pub url: String,
    pub database: String,
    pub measurement: String,
    /// Field names for the x, y and z axes, in that order
    pub fields: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// How far back each query looks
    #[serde(with = "duration_ms")]
    pub recency: Duration,
    /// Request timeout for a single query
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "http://influxdb:8086".to_string(),
            database: "sensor_data".to_string(),
            measurement: "sensor_data".to_string(),
            fields: vec!["accX".to_string(), "accY".to_string(), "accZ".to_string()],
            username: None,
            password: None,
            recency: Duration::from_millis(500),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Model file and label set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the model weights
    pub path: PathBuf,
    /// Label names in model output order
    pub labels: Vec<String>,
    /// Index of the label that triggers a notification
    pub target_label: usize,
    /// Samples per classification window
    pub window_samples: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("model.json"),
            labels: ["circle", "idle", "left-right", "up-down"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            target_label: 3,
            window_samples: 125,
        }
    }
}

/// Threshold and cooldown for detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Confidence must be strictly above this to fire
    pub threshold: f32,
    /// Minimum time between two firings
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            cooldown: Duration::from_secs(5),
        }
    }
}

/// Broadcast hub listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub listen_addr: String,
    /// Per-subscriber send bound before the subscriber is dropped
    #[serde(with = "duration_ms")]
    pub send_timeout: Duration,
    /// Events queued per subscriber
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8765".to_string(),
            send_timeout: Duration::from_secs(2),
            subscriber_buffer: 16,
        }
    }
}

/// Delivery of detections to the hub ingress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub hub_url: String,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Human-readable action carried in every detection event
    pub message: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            hub_url: "http://server-websocket:8765".to_string(),
            timeout: Duration::from_secs(3),
            message: "Move!".to_string(),
        }
    }
}

/// Driver loop pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause after an incomplete window or unavailable source
    #[serde(with = "duration_ms")]
    pub idle_backoff: Duration,
    /// Pause after every complete cycle (zero polls back to back)
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            idle_backoff: Duration::from_millis(100),
            poll_interval: Duration::ZERO,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
