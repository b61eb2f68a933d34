pub mod config;
pub mod engine;
pub mod punch;
pub mod registry;
pub mod service;
pub mod session;
pub mod tailer;
pub mod text;
pub mod watcher;

// Re-exports for convenience
pub use config::{ConfigError, ConfigStore, EngineConfig};
pub use engine::{CardRow, CounterEngine, CounterRecord, Snapshot};
pub use punch::{PunchEvent, parse_line};
pub use registry::{Registry, RegistryError};
pub use service::{Renderer, ServiceError, ServiceHandle};
pub use session::{LapSession, SessionError, SessionStatus};
pub use tailer::{LogTailer, TailError, TailRead, TailState};
pub use watcher::{DirectoryEvent, DirectoryWatcher};
