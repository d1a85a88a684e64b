use connectors::error::{StoreError, WarehouseError};
use thiserror::Error;

/// A record that could not be mapped to a target row. These are
/// dropped and counted, never fatal to the chunk.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Field '{field}' is missing or null")]
    MissingField { field: String },

    #[error("Field '{field}' is not a valid date: '{value}'")]
    InvalidDate { field: String, value: String },
}

/// Chunk-level write failure. Individual batch failures are absorbed
/// into the stats; only a fully failed chunk surfaces as an error.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("All {batches} batches of the chunk failed, last error: {last_error}")]
    ChunkFailed { batches: usize, last_error: String },
}

/// Top-level failure of one sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to clear previous dataset rows: {0}")]
    Clear(#[source] StoreError),

    #[error("Warehouse pagination failed: {0}")]
    Pager(#[from] WarehouseError),

    #[error("Chunk write failed: {0}")]
    Write(#[from] WriteError),
}
