use crate::{error::SyncError, pager::CursorPager, writer::BatchWriter};
use async_trait::async_trait;
use connectors::store::TargetStore;
use model::{job::JobStatus, progress::ProgressPayload, stats::WriteStats};
use std::{sync::Arc, time::Instant};
use sync_core::{governor::MemoryGovernor, registry::JobHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Receives a progress snapshot after every chunk. The queue worker
/// bridges this onto the job record; tests collect the payloads.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, payload: &ProgressPayload);
}

/// Sink for callers that only read progress through the registry.
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn publish(&self, _payload: &ProgressPayload) {}
}

/// Final accounting for one run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub status: JobStatus,
    pub stats: WriteStats,
    pub processed: u64,
    pub elapsed_seconds: f64,
}

/// Drives one sync run end to end: clear the dataset's previous rows,
/// estimate the total, then stream chunks from the pager into the
/// writer until the warehouse runs dry.
///
/// Cancellation and memory checks happen at chunk boundaries only; a
/// chunk in flight always completes or fails as a unit. Progress is
/// pushed to the registry, the store and the sink after every chunk;
/// the store write is best-effort telemetry.
pub struct SyncOrchestrator {
    pager: CursorPager,
    writer: BatchWriter,
    governor: Arc<MemoryGovernor>,
    store: Arc<dyn TargetStore>,
    sink: Arc<dyn ProgressSink>,
    job: JobHandle,
    dataset_id: i64,
}

impl SyncOrchestrator {
    pub fn new(
        pager: CursorPager,
        writer: BatchWriter,
        governor: Arc<MemoryGovernor>,
        store: Arc<dyn TargetStore>,
        sink: Arc<dyn ProgressSink>,
        job: JobHandle,
        dataset_id: i64,
    ) -> Self {
        SyncOrchestrator {
            pager,
            writer,
            governor,
            store,
            sink,
            job,
            dataset_id,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary, SyncError> {
        match self.execute(&cancel).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn execute(&mut self, cancel: &CancellationToken) -> Result<RunSummary, SyncError> {
        let started = Instant::now();
        self.job.set_status(JobStatus::Running).await;

        let table = self.writer.table();
        let cleared = self
            .store
            .delete_dataset_rows(table, self.dataset_id)
            .await
            .map_err(SyncError::Clear)?;
        info!(
            job_id = %self.job.id(),
            dataset_id = self.dataset_id,
            table,
            cleared,
            "Cleared previous dataset rows"
        );

        let total_estimate = self.pager.estimate_total().await;
        let mut stats = WriteStats::default();
        let mut processed = 0u64;

        loop {
            // Throttle first so a cancel that arrives during a memory
            // pause is observed right here, not a chunk later.
            self.governor.throttle(&self.job, cancel).await;

            if cancel.is_cancelled() {
                info!(
                    job_id = %self.job.id(),
                    processed,
                    "Cancellation requested, stopping at chunk boundary"
                );
                let payload = self.snapshot(total_estimate, processed, started);
                self.job.set_status(JobStatus::Cancelled).await;
                self.persist_progress("CANCELLED", &payload).await;
                return Ok(self.summary(JobStatus::Cancelled, stats, processed, started));
            }

            let Some(chunk) = self.pager.next_chunk().await? else {
                break;
            };

            let chunk_stats = self.writer.write_chunk(self.dataset_id, &chunk).await?;
            processed += chunk.len() as u64;
            stats.merge(&chunk_stats);

            let payload = self.snapshot(total_estimate, processed, started);
            self.job
                .record_progress(processed, total_estimate, payload.progress)
                .await;
            self.persist_progress("PROCESSING", &payload).await;
            self.sink.publish(&payload).await;

            // Let sibling jobs on this runtime make progress between
            // chunks.
            tokio::task::yield_now().await;
        }

        let payload = self.snapshot(total_estimate, processed, started);
        self.job
            .record_progress(processed, total_estimate, payload.progress)
            .await;
        self.job.set_status(JobStatus::Completed).await;
        self.persist_progress("COMPLETED", &payload).await;
        self.sink.publish(&payload).await;

        let summary = self.summary(JobStatus::Completed, stats, processed, started);
        info!(
            job_id = %self.job.id(),
            dataset_id = self.dataset_id,
            processed,
            inserted = stats.inserted_records,
            skipped = stats.skipped_records,
            errored = stats.error_records,
            elapsed_seconds = summary.elapsed_seconds,
            "Sync run completed"
        );
        Ok(summary)
    }

    fn snapshot(
        &self,
        total_estimate: Option<u64>,
        processed: u64,
        started: Instant,
    ) -> ProgressPayload {
        let memory_mb = self.governor.current_mb();
        ProgressPayload::compute(
            self.job.id(),
            total_estimate,
            processed,
            started.elapsed().as_secs_f64(),
            memory_mb,
        )
    }

    async fn persist_progress(&self, status: &str, payload: &ProgressPayload) {
        let metadata = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "Failed to serialize progress payload");
                return;
            }
        };
        if let Err(err) = self
            .store
            .save_dataset_progress(self.dataset_id, status, &metadata)
            .await
        {
            warn!(
                dataset_id = self.dataset_id,
                %err,
                "Failed to persist progress snapshot"
            );
        }
    }

    async fn fail(&self, err: &SyncError) {
        self.job.set_error(&err.to_string()).await;
        self.job.set_status(JobStatus::Failed).await;

        let metadata = serde_json::json!({ "error": err.to_string() });
        if let Err(persist_err) = self
            .store
            .save_dataset_progress(self.dataset_id, "FAILED", &metadata)
            .await
        {
            warn!(
                dataset_id = self.dataset_id,
                %persist_err,
                "Failed to persist failure status"
            );
        }
    }

    fn summary(
        &self,
        status: JobStatus,
        stats: WriteStats,
        processed: u64,
        started: Instant,
    ) -> RunSummary {
        RunSummary {
            status,
            stats,
            processed,
            elapsed_seconds: started.elapsed().as_secs_f64(),
        }
    }
}
