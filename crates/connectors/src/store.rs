use crate::error::StoreError;
use async_trait::async_trait;
use model::records::TargetRow;

/// Outcome of one bulk insert: duplicates on the natural key are
/// silently skipped, never errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub skipped: u64,
}

/// Write side of the pipeline: the transactional store that target
/// rows land in. Each call is one atomic write; no transaction spans
/// multiple calls.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Deletes all rows scoped to the dataset, making a completed run
    /// an idempotent replacement.
    async fn delete_dataset_rows(&self, table: &str, dataset_id: i64) -> Result<u64, StoreError>;

    /// Idempotent bulk upsert; duplicate natural keys are ignored.
    async fn insert_rows(&self, table: &str, rows: &[TargetRow])
    -> Result<InsertOutcome, StoreError>;

    /// Persists the latest status and progress snapshot on the dataset
    /// row. Best-effort telemetry, not a recovery source of truth.
    async fn save_dataset_progress(
        &self,
        dataset_id: i64,
        status: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), StoreError>;
}
