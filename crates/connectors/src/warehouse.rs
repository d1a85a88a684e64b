use crate::{error::WarehouseError, query::PagedQuery};
use async_trait::async_trait;
use model::{pagination::Cursor, records::WarehouseRow};

/// One fetched page plus the size that was requested, so the caller
/// can detect end-of-stream (a short page).
#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Vec<WarehouseRow>,
    pub requested: usize,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.rows.len() < self.requested
    }
}

/// Read side of the pipeline: a query engine that supports the
/// cursor-predicate and COUNT(*) forms of a paged query.
#[async_trait]
pub trait WarehouseSource: Send + Sync {
    /// Fetches one page after `cursor`. Does not retry; timeouts and
    /// query failures surface as typed errors.
    async fn fetch_page(
        &self,
        query: &PagedQuery,
        cursor: &Cursor,
        page_size: usize,
    ) -> Result<Page, WarehouseError>;

    /// COUNT(*) over the full result set, for progress math.
    async fn count(&self, query: &PagedQuery) -> Result<u64, WarehouseError>;
}
