use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    records_processed: AtomicU64,
    records_inserted: AtomicU64,
    records_skipped: AtomicU64,
    records_errored: AtomicU64,
    chunks_processed: AtomicU64,
    batch_retries: AtomicU64,
}

/// Run-scoped counters, cheap to clone and share across the writer's
/// concurrent batch tasks.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub records_processed: u64,
    pub records_inserted: u64,
    pub records_skipped: u64,
    pub records_errored: u64,
    pub chunks_processed: u64,
    pub batch_retries: u64,
}

impl RunMetrics {
    pub fn new() -> Self {
        RunMetrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_processed(&self, count: u64) {
        self.inner
            .records_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_inserted(&self, count: u64) {
        self.inner
            .records_inserted
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_skipped(&self, count: u64) {
        self.inner
            .records_skipped
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_errored(&self, count: u64) {
        self.inner
            .records_errored
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_chunks(&self, count: u64) {
        self.inner
            .chunks_processed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_retries(&self, count: u64) {
        self.inner.batch_retries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_processed: self.inner.records_processed.load(Ordering::Relaxed),
            records_inserted: self.inner.records_inserted.load(Ordering::Relaxed),
            records_skipped: self.inner.records_skipped.load(Ordering::Relaxed),
            records_errored: self.inner.records_errored.load(Ordering::Relaxed),
            chunks_processed: self.inner.chunks_processed.load(Ordering::Relaxed),
            batch_retries: self.inner.batch_retries.load(Ordering::Relaxed),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
