use crate::{
    error::WriteError,
    mapper::RecordMapper,
};
use connectors::{
    error::{ErrorClass, classify_store_error},
    store::{InsertOutcome, TargetStore},
};
use futures::{StreamExt, stream};
use model::{records::Chunk, records::TargetRow, stats::WriteStats};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Instant;
use sync_core::{
    metrics::RunMetrics,
    retry::{RetryDisposition, RetryPolicy},
    settings::SyncSettings,
};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Rows per store write.
    pub max_batch_size: usize,
    /// Batches in flight at once.
    pub max_concurrency: usize,
    /// Retry policy applied per batch.
    pub retry: RetryPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

impl WriterConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        WriterConfig {
            max_batch_size: settings.max_batch_size.max(1),
            max_concurrency: settings.write_concurrency.max(1),
            retry: settings.write_retry.clone(),
        }
    }
}

enum BatchOutcome {
    Written(InsertOutcome),
    Failed { rows: u64, error: String },
}

/// Writes chunks to the target store: maps records, splits them into
/// batches and pushes the batches concurrently, each under its own
/// retry loop.
///
/// Batches are independent; one batch exhausting its retries does not
/// stop its siblings. The chunk only fails when every batch does.
pub struct BatchWriter {
    store: Arc<dyn TargetStore>,
    mapper: Arc<dyn RecordMapper>,
    config: WriterConfig,
    metrics: RunMetrics,
}

impl BatchWriter {
    pub fn new(
        store: Arc<dyn TargetStore>,
        mapper: Arc<dyn RecordMapper>,
        config: WriterConfig,
        metrics: RunMetrics,
    ) -> Self {
        BatchWriter {
            store,
            mapper,
            config,
            metrics,
        }
    }

    pub fn table(&self) -> &'static str {
        self.mapper.table()
    }

    /// Maps and writes one chunk. Per-record mapping failures are
    /// dropped and counted; batch failures are absorbed into the stats
    /// unless every batch failed.
    pub async fn write_chunk(
        &self,
        dataset_id: i64,
        chunk: &Chunk,
    ) -> Result<WriteStats, WriteError> {
        let started = Instant::now();
        let mut stats = WriteStats {
            total_records: chunk.len() as u64,
            ..WriteStats::default()
        };

        let mut mapped = Vec::with_capacity(chunk.len());
        for row in &chunk.rows {
            match self.mapper.map(dataset_id, row) {
                Ok(target) => mapped.push(target),
                Err(err) => {
                    stats.error_records += 1;
                    warn!(
                        dataset_id,
                        page_no = chunk.page_no,
                        %err,
                        "Dropping record that failed mapping"
                    );
                }
            }
        }

        if mapped.is_empty() {
            stats.duration_ms = started.elapsed().as_millis() as u64;
            self.record_chunk_metrics(&stats);
            return Ok(stats);
        }

        let batches: Vec<Arc<Vec<TargetRow>>> = mapped
            .chunks(self.config.max_batch_size)
            .map(|batch| Arc::new(batch.to_vec()))
            .collect();
        let batch_count = batches.len();

        let outcomes: Vec<BatchOutcome> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| self.write_batch(dataset_id, chunk.page_no, index, batch))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        let mut failed = 0usize;
        let mut last_error = String::new();
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Written(insert) => {
                    stats.inserted_records += insert.inserted;
                    stats.skipped_records += insert.skipped;
                }
                BatchOutcome::Failed { rows, error } => {
                    failed += 1;
                    stats.error_records += rows;
                    last_error = error;
                }
            }
        }

        if failed == batch_count {
            return Err(WriteError::ChunkFailed {
                batches: batch_count,
                last_error,
            });
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        self.record_chunk_metrics(&stats);
        Ok(stats)
    }

    async fn write_batch(
        &self,
        dataset_id: i64,
        page_no: usize,
        index: usize,
        batch: Arc<Vec<TargetRow>>,
    ) -> BatchOutcome {
        let batch_id = batch_id(dataset_id, page_no, index);
        let table = self.mapper.table();
        let rows = batch.len() as u64;
        let attempts = AtomicU64::new(0);

        let result = self
            .config
            .retry
            .run(
                || {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    let store = self.store.clone();
                    let batch = batch.clone();
                    async move { store.insert_rows(table, &batch).await }
                },
                |err| match classify_store_error(err) {
                    ErrorClass::Transient => RetryDisposition::Retry,
                    ErrorClass::Fatal => RetryDisposition::Stop,
                },
            )
            .await;

        let retries = attempts.load(Ordering::Relaxed).saturating_sub(1);
        if retries > 0 {
            self.metrics.increment_retries(retries);
        }

        match result {
            Ok(insert) => {
                debug!(
                    batch_id = %batch_id,
                    rows,
                    inserted = insert.inserted,
                    skipped = insert.skipped,
                    retries,
                    "Batch written"
                );
                BatchOutcome::Written(insert)
            }
            Err(err) => {
                let err = err.into_inner();
                error!(batch_id = %batch_id, rows, retries, %err, "Batch failed");
                BatchOutcome::Failed {
                    rows,
                    error: err.to_string(),
                }
            }
        }
    }

    fn record_chunk_metrics(&self, stats: &WriteStats) {
        self.metrics.increment_processed(stats.total_records);
        self.metrics.increment_inserted(stats.inserted_records);
        self.metrics.increment_skipped(stats.skipped_records);
        self.metrics.increment_errored(stats.error_records);
        self.metrics.increment_chunks(1);
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }
}

/// Short stable id for correlating a batch across retry log lines.
fn batch_id(dataset_id: i64, page_no: usize, index: usize) -> String {
    let digest = blake3::hash(format!("{dataset_id}:{page_no}:{index}").as_bytes());
    digest.to_hex()[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mapper::ForecastMapper,
        support::{FakeStore, forecast_chunk},
    };
    use connectors::error::StoreError;
    use model::value::{FieldValue, Value};
    use std::time::Duration;
    use sync_core::retry::Backoff;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(
            4,
            Duration::from_millis(1),
            Duration::from_millis(5),
            Backoff::Linear,
        )
    }

    fn writer(store: Arc<FakeStore>, batch_size: usize) -> BatchWriter {
        BatchWriter::new(
            store,
            Arc::new(ForecastMapper),
            WriterConfig {
                max_batch_size: batch_size,
                max_concurrency: 4,
                retry: fast_retry(),
            },
            RunMetrics::new(),
        )
    }

    #[tokio::test]
    async fn one_bad_record_does_not_sink_the_chunk() {
        let mut chunk = forecast_chunk(1_000);
        chunk.rows[500]
            .field_values
            .retain(|f| f.name != "forecast_date");
        chunk.rows[500].field_values.push(FieldValue::new(
            "forecast_date",
            Value::String("not-a-date".into()),
        ));

        let store = Arc::new(FakeStore::new());
        let stats = writer(store.clone(), 500)
            .write_chunk(1, &chunk)
            .await
            .unwrap();

        assert_eq!(stats.total_records, 1_000);
        assert_eq!(stats.inserted_records, 999);
        assert_eq!(stats.error_records, 1);
        assert_eq!(store.row_count("forecast_records"), 999);
    }

    #[tokio::test]
    async fn transient_failures_retry_without_duplicating_rows() {
        let store = Arc::new(FakeStore::new());
        store.fail_next(StoreError::Server {
            code: 1213,
            message: "deadlock".into(),
        });
        store.fail_next(StoreError::Server {
            code: 1205,
            message: "lock wait timeout".into(),
        });

        let chunk = forecast_chunk(100);
        let w = writer(store.clone(), 500);
        let stats = w.write_chunk(1, &chunk).await.unwrap();

        assert_eq!(stats.inserted_records, 100);
        assert_eq!(stats.error_records, 0);
        assert_eq!(store.row_count("forecast_records"), 100);
        assert_eq!(w.metrics().snapshot().batch_retries, 2);
    }

    #[tokio::test]
    async fn fatal_batch_failure_spares_its_siblings() {
        let store = Arc::new(FakeStore::new());
        store.fail_next(StoreError::Server {
            code: 1452,
            message: "foreign key constraint fails".into(),
        });

        let chunk = forecast_chunk(1_000);
        let stats = writer(store.clone(), 500)
            .write_chunk(1, &chunk)
            .await
            .unwrap();

        assert_eq!(stats.inserted_records, 500);
        assert_eq!(stats.error_records, 500);
        assert_eq!(store.row_count("forecast_records"), 500);
    }

    #[tokio::test]
    async fn chunk_fails_only_when_every_batch_does() {
        let store = Arc::new(FakeStore::new());
        for _ in 0..2 {
            store.fail_next(StoreError::Server {
                code: 1452,
                message: "foreign key constraint fails".into(),
            });
        }

        let chunk = forecast_chunk(1_000);
        let err = writer(store, 500).write_chunk(1, &chunk).await.unwrap_err();
        assert!(matches!(err, WriteError::ChunkFailed { batches: 2, .. }));
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_batch() {
        let store = Arc::new(FakeStore::new());
        // More transient failures than the policy has attempts.
        for _ in 0..4 {
            store.fail_next(StoreError::Connection("broken pipe".into()));
        }

        let chunk = forecast_chunk(10);
        let err = writer(store.clone(), 500)
            .write_chunk(1, &chunk)
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::ChunkFailed { batches: 1, .. }));
        assert_eq!(store.row_count("forecast_records"), 0);
    }
}
