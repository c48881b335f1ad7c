use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use chrono::Duration;
use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::Timeframe;
use crate::signal::IndicatorSettings;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_timeframe() -> String {
    "6M".into()
}

fn default_requests_per_second() -> u32 {
    4
}

fn default_intraday_ttl() -> u64 {
    60
}

fn default_daily_ttl() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub indicators: IndicatorSettings,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Defaults to `<data_dir>/watchlist.json`.
    pub watchlist_file: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            data_dir: default_data_dir(),
            watchlist_file: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_intraday_ttl")]
    pub intraday_cache_ttl_secs: u64,
    #[serde(default = "default_daily_ttl")]
    pub daily_cache_ttl_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            timeframe: default_timeframe(),
            requests_per_second: default_requests_per_second(),
            cache_enabled: true,
            intraday_cache_ttl_secs: default_intraday_ttl(),
            daily_cache_ttl_secs: default_daily_ttl(),
        }
    }
}

impl AppConfig {
    pub fn watchlist_path(&self) -> PathBuf {
        match &self.general.watchlist_file {
            Some(file) => PathBuf::from(file),
            None => Path::new(&self.general.data_dir).join("watchlist.json"),
        }
    }

    pub fn cache_db_path(&self) -> PathBuf {
        Path::new(&self.general.data_dir).join("signal-watch.db")
    }
}

impl DataConfig {
    /// Configured default timeframe; only meaningful after validation.
    pub fn default_timeframe(&self) -> Timeframe {
        Timeframe::from_str(&self.timeframe).unwrap_or(Timeframe::Month6)
    }

    pub fn rate_limit(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.requests_per_second)
    }

    /// How long cached bars for `timeframe` stay fresh.
    pub fn cache_ttl(&self, timeframe: Timeframe) -> Duration {
        let secs = if timeframe.is_intraday() {
            self.intraday_cache_ttl_secs
        } else {
            self.daily_cache_ttl_secs
        };
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
        Duration::seconds(secs)
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    parse(&content)
}

/// Parse and validate an `AppConfig` from TOML text.
pub fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    let config: AppConfig = toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_data(config)?;
    validate_indicators(config)?;
    Ok(())
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "general.log_format \"{}\" is not one of {:?}",
                config.general.log_format, VALID_LOG_FORMATS
            ),
        }));
    }
    Ok(())
}

fn validate_data(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if Timeframe::from_str(&config.data.timeframe).is_none() {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "data.timeframe: unknown timeframe \"{}\"",
                config.data.timeframe
            ),
        }));
    }
    if config.data.requests_per_second == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "data.requests_per_second must be > 0".into(),
        }));
    }
    Ok(())
}

fn validate_indicators(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    config
        .indicators
        .build()
        .change_context(ConfigError::Validation {
            field: "indicators".into(),
        })?;
    Ok(())
}
