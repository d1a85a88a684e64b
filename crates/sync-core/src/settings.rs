use crate::{governor::GovernorConfig, retry::RetryPolicy};
use std::time::Duration;

/// Tunables for one sync run. Defaults match the sizes the pipeline
/// was profiled with; the CLI overrides them per invocation.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Rows requested per warehouse page.
    pub page_size: usize,
    /// Maximum rows per store write.
    pub max_batch_size: usize,
    /// Concurrent batch writes in flight.
    pub write_concurrency: usize,
    /// Warehouse query timeout.
    pub query_timeout: Duration,
    /// Retry policy for store writes.
    pub write_retry: RetryPolicy,
    /// Memory governor tunables.
    pub governor: GovernorConfig,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: 10_000,
            max_batch_size: 500,
            write_concurrency: 4,
            query_timeout: Duration::from_secs(30),
            write_retry: RetryPolicy::for_store_writes(),
            governor: GovernorConfig::default(),
        }
    }
}

impl SyncSettings {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_memory_ceiling_mb(mut self, ceiling_mb: u64) -> Self {
        self.governor.ceiling_mb = ceiling_mb;
        self
    }

    pub fn with_write_concurrency(mut self, concurrency: usize) -> Self {
        self.write_concurrency = concurrency.max(1);
        self
    }
}
