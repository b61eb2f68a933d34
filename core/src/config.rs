//! Engine configuration and persistence of `AppConfig`.
//!
//! The filter code and stage divisor are validated here before they reach the
//! engine. `AppConfig` is stored with confy under the `lapcounter` app name.

use lapcounter_types::AppConfig;
use thiserror::Error;

const APP_NAME: &str = "lapcounter";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stage divisor must be at least 1, got {0}")]
    InvalidDivisor(i64),
    #[error("stage divisor must be a whole number, got {0:?}")]
    NotANumber(String),
    #[error("filter code must not be empty")]
    EmptyFilterCode,
    #[error("failed to store configuration: {0}")]
    Store(#[from] confy::ConfyError),
}

/// Counting rules applied by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    filter_code: String,
    stage_divisor: u32,
}

impl EngineConfig {
    pub fn new(filter_code: &str, stage_divisor: i64) -> Result<Self, ConfigError> {
        Ok(Self {
            filter_code: validate_filter_code(filter_code)?,
            stage_divisor: validate_divisor(stage_divisor)?,
        })
    }

    /// Build from persisted settings, falling back to defaults for bad values.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let defaults = AppConfig::default();
        let filter_code = validate_filter_code(&config.filter_code).unwrap_or_else(|e| {
            tracing::warn!("Ignoring configured filter code: {}", e);
            defaults.filter_code.clone()
        });
        let stage_divisor =
            validate_divisor(i64::from(config.stage_divisor)).unwrap_or_else(|e| {
                tracing::warn!("Ignoring configured stage divisor: {}", e);
                defaults.stage_divisor
            });
        Self {
            filter_code,
            stage_divisor,
        }
    }

    pub fn filter_code(&self) -> &str {
        &self.filter_code
    }

    pub fn stage_divisor(&self) -> u32 {
        self.stage_divisor
    }

    pub(crate) fn set_filter_code(&mut self, code: &str) -> Result<(), ConfigError> {
        self.filter_code = validate_filter_code(code)?;
        Ok(())
    }

    pub(crate) fn set_stage_divisor(&mut self, n: i64) -> Result<(), ConfigError> {
        self.stage_divisor = validate_divisor(n)?;
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

fn validate_filter_code(code: &str) -> Result<String, ConfigError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ConfigError::EmptyFilterCode);
    }
    Ok(code.to_string())
}

fn validate_divisor(n: i64) -> Result<u32, ConfigError> {
    if n < 1 {
        return Err(ConfigError::InvalidDivisor(n));
    }
    u32::try_from(n).map_err(|_| ConfigError::InvalidDivisor(n))
}

/// Parse user input for the stage divisor.
pub fn parse_divisor(input: &str) -> Result<i64, ConfigError> {
    input
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::NotANumber(input.to_string()))
}

/// Where the service writes configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStore {
    /// The user's config directory, via confy.
    Confy,
    /// Keep changes in memory only.
    Memory,
}

impl ConfigStore {
    pub fn load(self) -> AppConfig {
        match self {
            Self::Confy => confy::load(APP_NAME, None).unwrap_or_else(|e| {
                tracing::warn!("Failed to load configuration, using defaults: {}", e);
                AppConfig::default()
            }),
            Self::Memory => AppConfig::default(),
        }
    }

    pub fn save(self, config: &AppConfig) -> Result<(), ConfigError> {
        match self {
            Self::Confy => Ok(confy::store(APP_NAME, None, config)?),
            Self::Memory => Ok(()),
        }
    }
}
