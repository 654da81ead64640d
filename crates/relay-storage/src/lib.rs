pub mod config_file;
pub mod flowlog;
pub mod usage;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("atomic rename failed: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("time formatting failed: {0}")]
    TimeFormat(#[from] time::error::Format),
}

pub use config_file::{load_or_init, reload, save};
pub use flowlog::{FlowLogs, RollingLog};
pub use usage::{UsageDocument, UsageStore, UsageTotals, UsageUpdate};
