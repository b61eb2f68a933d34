//! Directory change notifications.
//!
//! Wraps a notify watcher and forwards its events over a tokio channel so the
//! dispatcher can await them alongside commands. Dropping the watcher stops
//! delivery.

use std::path::{Path, PathBuf};

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    /// A file was created or written to.
    Changed(PathBuf),
    /// A file was removed or renamed away.
    Removed(PathBuf),
    /// The notify backend reported an error.
    Error(String),
}

pub struct DirectoryWatcher {
    directory: PathBuf,
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<DirectoryEvent>,
}

impl DirectoryWatcher {
    /// Watch the top level of `directory`.
    pub fn new(directory: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                for event in translate(res) {
                    // Receiver gone means the watcher is being torn down.
                    if tx.blocking_send(event).is_err() {
                        break;
                    }
                }
            },
            Config::default(),
        )?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        tracing::info!(directory = %directory.display(), "Watching directory");

        Ok(Self {
            directory: directory.to_path_buf(),
            _watcher: watcher,
            rx,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Next event, or `None` once the backend has shut down.
    pub async fn next_event(&mut self) -> Option<DirectoryEvent> {
        self.rx.recv().await
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        tracing::info!(directory = %self.directory.display(), "Stopped watching directory");
    }
}

fn translate(res: notify::Result<notify::Event>) -> Vec<DirectoryEvent> {
    match res {
        Ok(event) => match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                event.paths.into_iter().map(DirectoryEvent::Changed).collect()
            }
            EventKind::Remove(_) => event.paths.into_iter().map(DirectoryEvent::Removed).collect(),
            _ => Vec::new(),
        },
        Err(e) => vec![DirectoryEvent::Error(e.to_string())],
    }
}
