//! Configuration management for termpulse
//!
//! Loading, validation, and env/profile overrides for the watcher daemon.
//! Out-of-range numeric values are clamped to safe defaults with a warning;
//! only structural problems (missing file, empty paths, unknown backend)
//! are hard errors.

use crate::classify::CustomRuleConfig;
use crate::error::{Result, TermpulseError};
use crate::reduce::ReducerConfig;
use crate::session::SessionTrackerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub log: LogConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub rules: Vec<CustomRuleConfig>,
    #[serde(default)]
    pub suppressions: Vec<String>,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Activity log source and persistence destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub path: PathBuf,
    pub store_path: PathBuf,
}

/// Filesystem watching and change coalescing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// "notify" for OS notifications, "poll" for the timer fallback
    pub backend: String,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backend: "notify".to_string(),
            poll_interval_ms: 500,
            debounce_ms: 500,
        }
    }
}

/// Event detection and false-positive reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub dedup_window_secs: u64,
    pub threshold: f64,
    pub context_window: usize,
    pub cache_capacity: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 5,
            threshold: 0.5,
            context_window: 3,
            cache_capacity: 1000,
        }
    }
}

/// Notification rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    pub base_interval_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: 60,
        }
    }
}

/// Session lifecycle thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    pub idle_timeout_secs: u64,
    pub stale_timeout_secs: u64,
    pub max_recent_inactive: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            stale_timeout_secs: 86_400,
            max_recent_inactive: 10,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TermpulseError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TermpulseError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Clamp out-of-range values, then reject structural problems
        ConfigValidator::sanitize(&mut config);
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TermpulseError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TermpulseError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific volume profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .or_else(|| builtin_profile(profile))
            .ok_or_else(|| TermpulseError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(ms) = overrides.debounce_ms {
            self.watch.debounce_ms = ms;
        }
        if let Some(threshold) = overrides.detection_threshold {
            self.detection.threshold = threshold;
        }
        if let Some(secs) = overrides.base_interval_secs {
            self.throttle.base_interval_secs = secs;
        }
        ConfigValidator::sanitize(self);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TERMPULSE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("TERMPULSE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LOG__PATH" => {
                self.log.path = PathBuf::from(value);
            }
            "LOG__STORE_PATH" => {
                self.log.store_path = PathBuf::from(value);
            }
            "WATCH__BACKEND" => {
                self.watch.backend = value.to_string();
            }
            "WATCH__DEBOUNCE_MS" => {
                self.watch.debounce_ms =
                    value.parse().map_err(|_| TermpulseError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            "DETECTION__THRESHOLD" => {
                self.detection.threshold =
                    value.parse().map_err(|_| TermpulseError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as float", value),
                    })?;
            }
            "THROTTLE__BASE_INTERVAL_SECS" => {
                self.throttle.base_interval_secs =
                    value.parse().map_err(|_| TermpulseError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as integer", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            TermpulseError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("termpulse").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| TermpulseError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".termpulse"))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_secs(self.throttle.base_interval_secs)
    }

    pub fn reducer_config(&self) -> ReducerConfig {
        ReducerConfig {
            dedup_window: Duration::from_secs(self.detection.dedup_window_secs),
            detection_threshold: self.detection.threshold,
            context_window: self.detection.context_window,
        }
    }

    pub fn session_config(&self) -> SessionTrackerConfig {
        SessionTrackerConfig {
            idle_timeout: chrono::Duration::seconds(self.sessions.idle_timeout_secs as i64),
            stale_timeout: chrono::Duration::seconds(self.sessions.stale_timeout_secs as i64),
            max_recent_inactive: self.sessions.max_recent_inactive,
        }
    }
}

/// Built-in volume profiles: how aggressively change bursts are coalesced.
fn builtin_profile(name: &str) -> Option<ProfileOverrides> {
    let debounce_ms = match name {
        "quiet" => 2000,
        "normal" => 500,
        "busy" => 200,
        _ => return None,
    };
    Some(ProfileOverrides {
        debounce_ms: Some(debounce_ms),
        detection_threshold: None,
        base_interval_secs: None,
    })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.termpulse");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            log: LogConfig {
                path: data_dir.join("activity.log"),
                store_path: data_dir.join("entries.jsonl"),
            },
            watch: WatchConfig::default(),
            detection: DetectionConfig::default(),
            throttle: ThrottleConfig::default(),
            sessions: SessionsConfig::default(),
            rules: Vec::new(),
            suppressions: Vec::new(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.detection.threshold, 0.5);
        assert_eq!(loaded.watch.debounce_ms, 500);
        assert_eq!(loaded.sessions.idle_timeout_secs, 300);
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(&dir.path().join("absent.toml"));
        assert!(matches!(
            result,
            Err(TermpulseError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_builtin_profiles_adjust_debounce() {
        let mut config = Config::default();
        config.apply_profile("quiet").unwrap();
        assert_eq!(config.watch.debounce_ms, 2000);

        let mut config = Config::default();
        config.apply_profile("busy").unwrap();
        assert_eq!(config.watch.debounce_ms, 200);

        assert!(Config::default().apply_profile("loudest").is_err());
    }

    #[test]
    fn test_user_profile_overrides_threshold() {
        let mut config = Config::default();
        config.profiles.insert(
            "strict".to_string(),
            ProfileOverrides {
                debounce_ms: None,
                detection_threshold: Some(0.8),
                base_interval_secs: None,
            },
        );
        config.apply_profile("strict").unwrap();
        assert_eq!(config.detection.threshold, 0.8);
    }
}
