//! Card name registry.
//!
//! The registry file maps card ids to display names, one entry per line:
//!
//! ```text
//! CardID:7, Name:Alice
//! ```
//!
//! Lines that do not match are skipped. Cards seen in the log but missing here
//! are appended so the next session already knows them.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use lapcounter_types::MAX_NAME_CHARS;
use lapcounter_types::formatting::truncate_chars;
use thiserror::Error;

use crate::text;

const ID_PREFIX: &str = "CardID:";
const NAME_SEPARATOR: &str = ", Name:";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry unavailable at {path:?}: {source}")]
    Unavailable { path: PathBuf, source: io::Error },
    #[error("failed to append to registry {path:?}: {source}")]
    Append { path: PathBuf, source: io::Error },
}

/// Card id to display name, remembering registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    path: Option<PathBuf>,
    names: HashMap<String, String>,
    order: Vec<String>,
}

impl Registry {
    /// Empty in-memory registry with no backing file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry file at `path`.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let bytes = fs::read(path).map_err(|source| RegistryError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut registry = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };

        let contents = text::decode(&bytes);
        let mut skipped = 0usize;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_entry(line) {
                Some((id, name)) => registry.insert(id, name),
                None => skipped += 1,
            }
        }

        tracing::info!(
            path = %path.display(),
            cards = registry.len(),
            skipped,
            "Loaded card registry"
        );
        Ok(registry)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.names.contains_key(id)
    }

    /// Card ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Insert or replace a name in memory. Last write wins.
    pub fn insert(&mut self, id: &str, name: &str) {
        self.insert_normalized(id, normalize_name(name));
    }

    fn insert_normalized(&mut self, id: &str, name: String) {
        if self.names.insert(id.to_string(), name).is_none() {
            self.order.push(id.to_string());
        }
    }

    /// Register a newly discovered card, persisting it to the backing file.
    ///
    /// The in-memory entry is always added. The returned error only reports
    /// that the file write failed. The file gets the same trimmed, shortened
    /// name that is kept in memory.
    pub fn register(&mut self, id: &str, name: &str) -> Result<(), RegistryError> {
        let name = normalize_name(name);
        let result = match &self.path {
            Some(path) => append(path, id, &name),
            None => Ok(()),
        };
        self.insert_normalized(id, name);
        result
    }
}

fn normalize_name(name: &str) -> String {
    truncate_chars(name.trim(), MAX_NAME_CHARS).to_string()
}

/// Parse one registry line into `(id, name)`.
pub fn parse_entry(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let rest = line.strip_prefix(ID_PREFIX)?;
    if rest.matches(NAME_SEPARATOR).count() != 1 {
        return None;
    }
    let (id, name) = rest.split_once(NAME_SEPARATOR)?;
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    Some((id, name.trim()))
}

/// Append `CardID:<id>, Name:<name>` to the registry at `path`.
///
/// Writes a newline first when the file does not already end with one.
pub fn append(path: &Path, id: &str, name: &str) -> Result<(), RegistryError> {
    let err = |source| RegistryError::Append {
        path: path.to_path_buf(),
        source,
    };

    let needs_newline = {
        match File::open(path) {
            Ok(mut file) => {
                let len = file.metadata().map_err(err)?.len();
                if len == 0 {
                    false
                } else {
                    file.seek(SeekFrom::End(-1)).map_err(err)?;
                    let mut last = [0u8; 1];
                    file.read_exact(&mut last).map_err(err)?;
                    last[0] != b'\n'
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(err(e)),
        }
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(err)?;

    let mut entry = String::new();
    if needs_newline {
        entry.push('\n');
    }
    entry.push_str(&format!("{}{}{}{}\n", ID_PREFIX, id, NAME_SEPARATOR, name));
    file.write_all(entry.as_bytes()).map_err(err)?;

    tracing::info!(path = %path.display(), card_id = id, display_name = name, "Registered new card");
    Ok(())
}
