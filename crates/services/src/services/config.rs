//! Agent configuration loaded from `config.toml`.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use utils::assets::{self, NoHomeDir};

use super::{location::LocationOptions, location_poller::PollerConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    NoHomeDir(#[from] NoHomeDir),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub tracking: TrackingConfig,
    pub location: LocationConfig,
    pub notifications: NotificationConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Per-request timeout; unset leaves the HTTP client's default.
    pub request_timeout_secs: Option<u64>,
    /// Ask the backend for AI-generated tips.
    pub ai_tips: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://68.183.102.75:1337".to_string(),
            request_timeout_secs: None,
            ai_tips: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub stationary_interval_secs: u64,
    pub moving_interval_secs: u64,
    pub movement_threshold_meters: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            stationary_interval_secs: 60,
            moving_interval_secs: 30,
            movement_threshold_meters: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub maximum_age_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 15_000,
            maximum_age_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotifierKind {
    Desktop,
    Log,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub notifier: NotifierKind,
    pub channel_id: String,
    pub channel_name: String,
    pub app_name: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            notifier: NotifierKind::Desktop,
            channel_id: "enact-tips".to_string(),
            channel_name: "ENACT tips".to_string(),
            app_name: "ENACT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:4040".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
}

/// Values supplied outside the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub bind: Option<String>,
    pub database_path: Option<PathBuf>,
    pub notifier: Option<NotifierKind>,
}

impl Config {
    /// Parse the file at `path`. Validation is left to the caller so that
    /// command-line overrides can be applied first.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load `explicit` if given, otherwise the platform config file when it
    /// exists, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        let path = assets::default_config_path()?;
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Config::default())
        }
    }

    /// Layer command-line and environment overrides over the file values.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.backend.base_url = base_url;
        }
        if let Some(bind) = overrides.bind {
            self.server.bind = bind;
        }
        if let Some(path) = overrides.database_path {
            self.storage.database_path = Some(path);
        }
        if let Some(notifier) = overrides.notifier {
            self.notifications.notifier = notifier;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        let t = &self.tracking;
        if t.stationary_interval_secs == 0 || t.moving_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "tracking intervals must be at least one second".to_string(),
            ));
        }
        if !(t.movement_threshold_meters.is_finite() && t.movement_threshold_meters > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "movement_threshold_meters must be positive, got {}",
                t.movement_threshold_meters
            )));
        }
        if self.location.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "location.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::Invalid(format!("backend.base_url {:?}: {e}", self.backend.base_url))
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "backend.base_url {:?} cannot be a base URL",
                self.backend.base_url
            )));
        }
        Ok(url)
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(assets::default_database_path()?),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.backend.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            stationary_interval: Duration::from_secs(self.tracking.stationary_interval_secs),
            moving_interval: Duration::from_secs(self.tracking.moving_interval_secs),
            movement_threshold_meters: self.tracking.movement_threshold_meters,
            location: self.location_options(),
            ai_tips: self.backend.ai_tips,
        }
    }

    pub fn location_options(&self) -> LocationOptions {
        LocationOptions {
            high_accuracy: self.location.high_accuracy,
            timeout: Duration::from_millis(self.location.timeout_ms),
            maximum_age: Duration::from_millis(self.location.maximum_age_ms),
        }
    }
}
