use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const APP_NAME: &str = "usage-monitor";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_days")]
    pub default_days: i64,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}
fn default_days() -> i64 {
    7
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
            default_days: default_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Documented default for the session log source.
    pub sessions_dir: Option<PathBuf>,
    /// Base directory holding `reports/` and `logs/`.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

fn default_max_age_days() -> u32 {
    30
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonConfig {
    #[serde(default = "default_spike_threshold")]
    pub spike_threshold_pct: f64,
}

fn default_spike_threshold() -> f64 {
    50.0
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            spike_threshold_pct: default_spike_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_lock_timeout() -> u64 {
    5
}
fn default_stale_after() -> u64 {
    600
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_lock_timeout(),
            stale_after_secs: default_stale_after(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join(APP_NAME).join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Base directory for reports and logs: config value, else the platform data dir.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.paths.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if self.settings.default_days <= 0 {
            issues.push(format!(
                "Invalid default_days: {} (must be a positive integer)",
                self.settings.default_days
            ));
        }
        if self.retention.max_age_days == 0 {
            issues.push("Invalid retention.max_age_days: 0 (must be at least 1)".to_string());
        }
        if !self.comparison.spike_threshold_pct.is_finite()
            || self.comparison.spike_threshold_pct <= 0.0
        {
            issues.push(format!(
                "Invalid comparison.spike_threshold_pct: {} (must be a positive number)",
                self.comparison.spike_threshold_pct
            ));
        }
        if self.lock.stale_after_secs == 0 {
            issues.push("Invalid lock.stale_after_secs: 0 (must be at least 1)".to_string());
        }
        if let Some(dir) = &self.paths.sessions_dir {
            if dir.as_os_str().is_empty() {
                issues.push("paths.sessions_dir is set but empty".to_string());
            }
        }
        issues
    }
}
