//! The lap counting session: registry, tailer and engine as one unit.
//!
//! Everything that mutates counting state goes through `LapSession`, and the
//! dispatcher owns exactly one of them, so mutations never interleave.

use std::fs;
use std::path::{Path, PathBuf};

use lapcounter_types::AppConfig;
use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::engine::{CounterEngine, Snapshot};
use crate::registry::{Registry, RegistryError};
use crate::tailer::LogTailer;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0:?} is not a readable directory")]
    NotADirectory(PathBuf),
    #[error("no registry file at {0:?}")]
    RegistryMissing(PathBuf),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Point-in-time description of the session, for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub directory: Option<PathBuf>,
    pub filter_code: String,
    pub stage_divisor: u32,
    pub cards: usize,
    /// Tracked log files and their consumed byte counts.
    pub files: Vec<(PathBuf, u64)>,
}

pub struct LapSession {
    app_config: AppConfig,
    directory: Option<PathBuf>,
    /// Files never tailed, such as this process's own log file.
    excluded: Vec<PathBuf>,
    tailer: LogTailer,
    engine: CounterEngine,
}

impl LapSession {
    pub fn new(app_config: AppConfig) -> Self {
        let engine = CounterEngine::new(EngineConfig::from_app_config(&app_config), Registry::new());
        Self {
            app_config,
            directory: None,
            excluded: Vec::new(),
            tailer: LogTailer::new(),
            engine,
        }
    }

    /// Configuration as it should be persisted.
    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn engine(&self) -> &CounterEngine {
        &self.engine
    }

    pub fn tailer(&self) -> &LogTailer {
        &self.tailer
    }

    /// Never tail `path`, even when it sits in the selected directory.
    ///
    /// The file need not exist yet, but its parent directory must for the
    /// exclusion to match.
    pub fn exclude_path(&mut self, path: &Path) {
        let path = match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|parent| parent.join(name))
                .unwrap_or_else(|_| path.to_path_buf()),
            _ => path.to_path_buf(),
        };
        tracing::debug!(path = %path.display(), "Excluding path from tailing");
        self.excluded.push(path);
    }

    /// Canonical form of `dir`, provided it holds a registry file.
    pub fn resolve_directory(&self, dir: &Path) -> Result<PathBuf, SessionError> {
        let dir = dir
            .canonicalize()
            .map_err(|_| SessionError::NotADirectory(dir.to_path_buf()))?;
        if !dir.is_dir() {
            return Err(SessionError::NotADirectory(dir));
        }
        let registry = dir.join(&self.app_config.registry_file_name);
        if !registry.is_file() {
            return Err(SessionError::RegistryMissing(registry));
        }
        Ok(dir)
    }

    /// Start counting for `dir`: load its registry, reset all counts and read
    /// every log file already present.
    ///
    /// On error the current session is left untouched.
    pub fn select_directory(&mut self, dir: &Path) -> Result<Snapshot, SessionError> {
        let dir = self.resolve_directory(dir)?;
        let registry = Registry::load(&dir.join(&self.app_config.registry_file_name))?;

        self.engine.set_registry(registry);
        self.tailer.clear();
        self.directory = Some(dir.clone());
        self.app_config.log_directory = Some(dir.to_string_lossy().into_owned());

        let mut snapshot = self.engine.reset();
        for path in self.existing_log_files(&dir) {
            if let Some(next) = self.on_file_changed(&path) {
                snapshot.changed.extend(next.changed);
                snapshot.rows = next.rows;
            }
        }

        tracing::info!(
            directory = %dir.display(),
            cards = snapshot.len(),
            files = self.tailer.offsets().count(),
            "Directory selected"
        );
        Ok(snapshot)
    }

    /// Whether `path` is a log file in the selected directory.
    pub fn is_log_file(&self, path: &Path) -> bool {
        let Some(dir) = &self.directory else {
            return false;
        };
        if path.parent() != Some(dir.as_path()) {
            return false;
        }
        if self.excluded.iter().any(|excluded| excluded == path) {
            return false;
        }
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.app_config.is_log_file(name))
    }

    /// Handle a change notification for `path`.
    ///
    /// Returns `None` when the path is not a tracked log file or could not be
    /// read. A read error leaves the offset in place for the next notification.
    pub fn on_file_changed(&mut self, path: &Path) -> Option<Snapshot> {
        if !self.is_log_file(path) {
            return None;
        }

        let read = match self.tailer.on_changed(path) {
            Ok(read) => read,
            Err(e) => {
                tracing::warn!("{}", e);
                return None;
            }
        };

        let snapshot = if read.rotated {
            self.engine.ingest(self.tailer.history(), true)
        } else {
            let lines = self.tailer.lines(path, read.new_lines);
            self.engine.ingest(lines.iter().map(String::as_str), false)
        };
        Some(snapshot)
    }

    pub fn set_filter_code(&mut self, code: &str) -> Result<Snapshot, ConfigError> {
        let snapshot = self.engine.set_filter_code(code, self.tailer.history())?;
        self.app_config.filter_code = self.engine.config().filter_code().to_string();
        Ok(snapshot)
    }

    pub fn set_stage_divisor(&mut self, n: i64) -> Result<Snapshot, ConfigError> {
        let snapshot = self.engine.set_stage_divisor(n, self.tailer.history())?;
        self.app_config.stage_divisor = self.engine.config().stage_divisor();
        Ok(snapshot)
    }

    /// Zero every count without touching configuration or tail offsets.
    pub fn reset(&mut self) -> Snapshot {
        self.engine.reset()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        let config = self.engine.config();
        SessionStatus {
            directory: self.directory.clone(),
            filter_code: config.filter_code().to_string(),
            stage_divisor: config.stage_divisor(),
            cards: self.engine.registry().len(),
            files: self
                .tailer
                .offsets()
                .map(|(path, offset)| (path.to_path_buf(), offset))
                .collect(),
        }
    }

    fn existing_log_files(&self, dir: &Path) -> Vec<PathBuf> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(directory = %dir.display(), "Failed to list directory: {}", e);
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.is_log_file(path))
            .collect();
        files.sort();
        files
    }
}
