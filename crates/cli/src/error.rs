use connectors::error::{StoreError, WarehouseError};
use sync_engine::error::SyncError;
use sync_queue::error::QueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid dataset kind '{0}', expected 'forecast' or 'actuals'")]
    InvalidKind(String),

    #[error("Invalid job ID '{0}'")]
    InvalidJobId(String),

    #[error("Invalid job state '{0}'")]
    InvalidState(String),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
