//! Dispatcher: the single task that owns the session.
//!
//! Commands from the front end and file notifications from the watcher are
//! funneled into one loop, so ingestion, replays and directory changes run one
//! at a time in arrival order.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ConfigStore};
use crate::engine::Snapshot;
use crate::session::{LapSession, SessionError, SessionStatus};
use crate::watcher::{DirectoryEvent, DirectoryWatcher};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },
    #[error("lap counter service is not running")]
    ServiceStopped,
}

/// Presentation capability. Called after every command that produced a
/// snapshot and after every file update that changed a card.
///
/// A card in `snapshot.changed` may be new or merely updated. The full row set
/// is in `snapshot.rows`; a card missing from it is no longer shown.
pub trait Renderer: Send + 'static {
    fn render(&mut self, snapshot: &Snapshot);
}

type Reply<T> = oneshot::Sender<Result<T, ServiceError>>;

pub enum ServiceCommand {
    SelectDirectory(PathBuf, Reply<()>),
    SetFilterCode(String, Reply<()>),
    SetStageDivisor(i64, Reply<()>),
    Stop,
    Snapshot(oneshot::Sender<Snapshot>),
    Status(oneshot::Sender<SessionStatus>),
    Shutdown,
}

/// Cloneable handle for issuing commands to the dispatcher.
#[derive(Clone)]
pub struct ServiceHandle {
    cmd_tx: mpsc::Sender<ServiceCommand>,
}

impl ServiceHandle {
    /// Start watching `path`. Rejected when it has no registry file.
    pub async fn select_directory(&self, path: impl Into<PathBuf>) -> Result<(), ServiceError> {
        self.request(|reply| ServiceCommand::SelectDirectory(path.into(), reply))
            .await?
    }

    pub async fn set_filter_code(&self, code: impl Into<String>) -> Result<(), ServiceError> {
        self.request(|reply| ServiceCommand::SetFilterCode(code.into(), reply))
            .await?
    }

    /// Rejected with `ConfigError::InvalidDivisor` when `n < 1`.
    pub async fn set_stage_divisor(&self, n: i64) -> Result<(), ServiceError> {
        self.request(|reply| ServiceCommand::SetStageDivisor(n, reply))
            .await?
    }

    /// Stop watching. Safe to call at any time, any number of times.
    pub async fn stop(&self) -> Result<(), ServiceError> {
        self.send(ServiceCommand::Stop).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ServiceError> {
        self.request(ServiceCommand::Snapshot).await
    }

    pub async fn status(&self) -> Result<SessionStatus, ServiceError> {
        self.request(ServiceCommand::Status).await
    }

    /// End the dispatcher loop.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.send(ServiceCommand::Shutdown).await
    }

    async fn send(&self, cmd: ServiceCommand) -> Result<(), ServiceError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ServiceError::ServiceStopped)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServiceCommand,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| ServiceError::ServiceStopped)
    }
}

/// Spawn the dispatcher on the current tokio runtime. It takes ownership of
/// `session`.
pub fn spawn<R: Renderer>(
    session: LapSession,
    store: ConfigStore,
    renderer: R,
) -> (ServiceHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let dispatcher = Dispatcher {
        session,
        renderer,
        store,
        watcher: None,
        cmd_rx,
    };
    let handle = tokio::spawn(dispatcher.run());
    (ServiceHandle { cmd_tx }, handle)
}

enum Input {
    Command(Option<ServiceCommand>),
    Watch(Option<DirectoryEvent>),
}

struct Dispatcher<R> {
    session: LapSession,
    renderer: R,
    store: ConfigStore,
    watcher: Option<DirectoryWatcher>,
    cmd_rx: mpsc::Receiver<ServiceCommand>,
}

impl<R: Renderer> Dispatcher<R> {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                cmd = self.cmd_rx.recv() => Input::Command(cmd),
                event = next_watch_event(&mut self.watcher) => Input::Watch(event),
            };

            match input {
                Input::Command(None) | Input::Command(Some(ServiceCommand::Shutdown)) => break,
                Input::Command(Some(cmd)) => self.handle_command(cmd),
                Input::Watch(Some(event)) => self.handle_event(event),
                Input::Watch(None) => {
                    tracing::error!("Directory watcher closed unexpectedly");
                    self.watcher = None;
                }
            }
        }
        tracing::debug!("Dispatcher stopped");
    }

    fn handle_command(&mut self, cmd: ServiceCommand) {
        match cmd {
            ServiceCommand::SelectDirectory(path, reply) => {
                let _ = reply.send(self.select_directory(&path));
            }
            ServiceCommand::SetFilterCode(code, reply) => {
                let result = self.session.set_filter_code(&code).map_err(ServiceError::from);
                let _ = reply.send(result.map(|snapshot| self.publish(snapshot, true)));
            }
            ServiceCommand::SetStageDivisor(n, reply) => {
                let result = self.session.set_stage_divisor(n).map_err(ServiceError::from);
                let _ = reply.send(result.map(|snapshot| self.publish(snapshot, true)));
            }
            ServiceCommand::Stop => {
                if self.watcher.take().is_none() {
                    tracing::debug!("Stop requested while not watching");
                }
            }
            ServiceCommand::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            ServiceCommand::Status(reply) => {
                let _ = reply.send(self.session.status());
            }
            ServiceCommand::Shutdown => {}
        }
    }

    fn select_directory(&mut self, path: &Path) -> Result<(), ServiceError> {
        let dir = match self.session.resolve_directory(path) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("Directory selection rejected: {}", e);
                return Err(e.into());
            }
        };

        // Watch before the initial read so nothing written in between is missed.
        // The previous watcher keeps running until the new session is in place.
        let watcher = DirectoryWatcher::new(&dir).map_err(|source| ServiceError::Watch {
            path: dir.clone(),
            source,
        })?;
        let snapshot = self.session.select_directory(&dir)?;
        self.watcher = Some(watcher);

        self.publish(snapshot, true);
        Ok(())
    }

    fn handle_event(&mut self, event: DirectoryEvent) {
        match event {
            DirectoryEvent::Changed(path) => {
                if let Some(snapshot) = self.session.on_file_changed(&path) {
                    self.publish(snapshot, false);
                }
            }
            DirectoryEvent::Removed(path) => {
                if self.session.is_log_file(&path) {
                    tracing::info!(path = %path.display(), "Log file removed");
                }
            }
            DirectoryEvent::Error(err) => {
                tracing::error!("Directory watcher error: {}", err);
            }
        }
    }

    /// Forward `snapshot` to the renderer.
    ///
    /// Snapshots from commands are always rendered and the configuration is
    /// persisted, since a new directory can drop rows without changing any
    /// remaining card. File updates render only when a card changed.
    fn publish(&mut self, snapshot: Snapshot, from_command: bool) {
        if from_command || !snapshot.changed.is_empty() {
            self.renderer.render(&snapshot);
        }
        if from_command {
            if let Err(e) = self.store.save(self.session.app_config()) {
                tracing::warn!("{}", e);
            }
        }
    }
}

async fn next_watch_event(watcher: &mut Option<DirectoryWatcher>) -> Option<DirectoryEvent> {
    match watcher {
        Some(watcher) => watcher.next_event().await,
        None => std::future::pending().await,
    }
}
