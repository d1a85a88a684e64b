use connectors::{error::WarehouseError, query::PagedQuery, warehouse::WarehouseSource};
use model::{pagination::Cursor, records::Chunk};
use std::sync::Arc;
use tracing::{debug, warn};

/// Streams a paged query as a sequence of chunks, one warehouse round
/// trip per chunk.
///
/// End of stream is detected from a short page, so an exact-multiple
/// result set costs one extra empty fetch. The pager holds no rows
/// beyond the chunk it just returned; peak memory is bounded by the
/// page size, not the result set.
pub struct CursorPager {
    source: Arc<dyn WarehouseSource>,
    query: PagedQuery,
    page_size: usize,
    cursor: Cursor,
    finished: bool,
    pages_fetched: usize,
    rows_fetched: u64,
}

impl CursorPager {
    pub fn new(source: Arc<dyn WarehouseSource>, query: PagedQuery, page_size: usize) -> Self {
        CursorPager {
            source,
            query,
            page_size: page_size.max(1),
            cursor: Cursor::None,
            finished: false,
            pages_fetched: 0,
            rows_fetched: 0,
        }
    }

    /// COUNT(*) estimate for progress math. Failure is not fatal; the
    /// run proceeds and reports raw counts instead of percentages.
    pub async fn estimate_total(&self) -> Option<u64> {
        match self.source.count(&self.query).await {
            Ok(total) => Some(total),
            Err(err) => {
                warn!(%err, "Count estimate failed, progress will report raw counts");
                None
            }
        }
    }

    /// Fetches the next chunk, or `None` once the stream is exhausted.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, WarehouseError> {
        if self.finished {
            return Ok(None);
        }

        let page = self
            .source
            .fetch_page(&self.query, &self.cursor, self.page_size)
            .await?;

        if page.rows.is_empty() {
            self.finished = true;
            return Ok(None);
        }
        if page.is_last() {
            self.finished = true;
        }

        let next = match page.rows.last() {
            Some(last) => {
                let value = last.get_value(&self.query.ordering_column);
                if value.is_null() {
                    warn!(
                        column = %self.query.ordering_column,
                        "Ordering value missing on last row, stopping pagination after this chunk"
                    );
                    self.finished = true;
                    self.cursor.clone()
                } else {
                    Cursor::After(value)
                }
            }
            None => self.cursor.clone(),
        };

        let chunk = Chunk {
            cursor: self.cursor.clone(),
            next: next.clone(),
            page_no: self.pages_fetched,
            rows: page.rows,
        };

        self.pages_fetched += 1;
        self.rows_fetched += chunk.len() as u64;
        self.cursor = next;

        debug!(
            page_no = chunk.page_no,
            rows = chunk.len(),
            cursor = %chunk.next,
            "Fetched warehouse page"
        );
        Ok(Some(chunk))
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched
    }
}
