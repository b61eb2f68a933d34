//! Shared configuration types for the lap counter.
//!
//! Kept free of I/O so both the core engine and the terminal front end can
//! depend on it. Persistence lives in `lapcounter-core`.

pub mod formatting;

use serde::{Deserialize, Serialize};

/// Control code counted as a lap when nothing else is configured.
pub const DEFAULT_FILTER_CODE: &str = "31";
/// Laps per stage when nothing else is configured.
pub const DEFAULT_STAGE_DIVISOR: u32 = 3;
/// Registry file that must exist in a directory before it can be watched.
pub const DEFAULT_REGISTRY_FILE: &str = "cardName.txt";
/// Display names are cut to this many characters on ingestion.
pub const MAX_NAME_CHARS: usize = 40;

/// Persisted application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Last selected directory, re-selected on startup when present.
    pub log_directory: Option<String>,
    pub filter_code: String,
    pub stage_divisor: u32,
    pub registry_file_name: String,
    /// Only tail this file name. `None` tails every file except the registry.
    pub log_file_name: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_directory: None,
            filter_code: DEFAULT_FILTER_CODE.to_string(),
            stage_divisor: DEFAULT_STAGE_DIVISOR,
            registry_file_name: DEFAULT_REGISTRY_FILE.to_string(),
            log_file_name: None,
        }
    }
}

impl AppConfig {
    /// Whether `file_name` is a log file this configuration wants tailed.
    pub fn is_log_file(&self, file_name: &str) -> bool {
        if file_name == self.registry_file_name {
            return false;
        }
        match &self.log_file_name {
            Some(name) => name == file_name,
            None => true,
        }
    }
}
