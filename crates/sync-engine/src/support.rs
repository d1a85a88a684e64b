//! In-memory fakes shared by the engine's unit tests.

use crate::orchestrator::ProgressSink;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use connectors::{
    error::{StoreError, WarehouseError},
    query::PagedQuery,
    store::{InsertOutcome, TargetStore},
    warehouse::{Page, WarehouseSource},
};
use model::{
    pagination::Cursor,
    progress::ProgressPayload,
    records::{Chunk, TargetRow, WarehouseRow},
    value::{FieldValue, Value},
};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use sync_core::governor::MemorySampler;

/// Synthetic forecast rows with an integer `row_id` ordering column
/// and distinct natural keys.
pub fn numbered_rows(n: usize) -> Vec<WarehouseRow> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (1..=n)
        .map(|i| {
            WarehouseRow::new(vec![
                FieldValue::new("row_id", Value::Int(i as i64)),
                FieldValue::new("product_code", Value::String(format!("SKU-{i}"))),
                FieldValue::new("location_code", Value::String(format!("DC-{}", i % 5))),
                FieldValue::new(
                    "forecast_date",
                    Value::Date(base + Duration::days((i % 28) as i64)),
                ),
                FieldValue::new("quantity", Value::Float(i as f64 * 1.5)),
                FieldValue::new("model_name", Value::String("baseline".into())),
            ])
        })
        .collect()
}

pub fn row_id_query() -> PagedQuery {
    PagedQuery::new("SELECT * FROM demand_forecasts", "row_id")
}

pub fn forecast_chunk(n: usize) -> Chunk {
    Chunk {
        rows: numbered_rows(n),
        cursor: Cursor::None,
        next: Cursor::None,
        page_no: 0,
    }
}

/// Warehouse fake answering paged queries from an in-memory row set,
/// honoring the cursor predicate and the page size.
pub struct FakeWarehouse {
    rows: Vec<WarehouseRow>,
    fail_count: bool,
    fetches: AtomicUsize,
}

impl FakeWarehouse {
    pub fn new(rows: Vec<WarehouseRow>) -> Self {
        FakeWarehouse {
            rows,
            fail_count: false,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WarehouseSource for FakeWarehouse {
    async fn fetch_page(
        &self,
        query: &PagedQuery,
        cursor: &Cursor,
        page_size: usize,
    ) -> Result<Page, WarehouseError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let floor = match cursor {
            Cursor::None => None,
            Cursor::After(value) => value.as_i64(),
        };

        let mut rows: Vec<WarehouseRow> = self
            .rows
            .iter()
            .filter(|row| {
                let ord = row.get_value(&query.ordering_column).as_i64();
                match (ord, floor) {
                    (Some(ord), Some(floor)) => ord > floor,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.get_value(&query.ordering_column).as_i64());
        rows.truncate(page_size);

        Ok(Page {
            rows,
            requested: page_size,
        })
    }

    async fn count(&self, _query: &PagedQuery) -> Result<u64, WarehouseError> {
        if self.fail_count {
            return Err(WarehouseError::Query("relation does not exist".into()));
        }
        Ok(self.rows.len() as u64)
    }
}

/// Store fake with ignore-duplicates insert semantics and scriptable
/// failures, popped one per call.
pub struct FakeStore {
    tables: Mutex<HashMap<String, Vec<TargetRow>>>,
    keys: Mutex<HashSet<String>>,
    insert_failures: Mutex<VecDeque<StoreError>>,
    delete_failures: Mutex<VecDeque<StoreError>>,
    progress: Mutex<Vec<(String, serde_json::Value)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        FakeStore {
            tables: Mutex::new(HashMap::new()),
            keys: Mutex::new(HashSet::new()),
            insert_failures: Mutex::new(VecDeque::new()),
            delete_failures: Mutex::new(VecDeque::new()),
            progress: Mutex::new(Vec::new()),
        }
    }

    /// Queues an error for the next insert call.
    pub fn fail_next(&self, err: StoreError) {
        self.insert_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_delete(&self, err: StoreError) {
        self.delete_failures.lock().unwrap().push_back(err);
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn last_progress(&self) -> Option<(String, serde_json::Value)> {
        self.progress.lock().unwrap().last().cloned()
    }

    pub fn progress_log(&self) -> Vec<(String, serde_json::Value)> {
        self.progress.lock().unwrap().clone()
    }

    fn row_key(table: &str, row: &TargetRow) -> String {
        let values: Vec<String> = row.values.iter().map(|v| v.to_string()).collect();
        format!("{table}|{}", values.join("\u{1f}"))
    }

    fn dataset_of(row: &TargetRow) -> Option<i64> {
        row.columns
            .iter()
            .position(|c| c == "dataset_id")
            .and_then(|idx| row.values.get(idx))
            .and_then(|v| v.as_i64())
    }
}

#[async_trait]
impl TargetStore for FakeStore {
    async fn delete_dataset_rows(&self, table: &str, dataset_id: i64) -> Result<u64, StoreError> {
        if let Some(err) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut tables = self.tables.lock().unwrap();
        let mut removed = 0u64;
        if let Some(rows) = tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|row| Self::dataset_of(row) != Some(dataset_id));
            removed = (before - rows.len()) as u64;
        }

        let mut keys = self.keys.lock().unwrap();
        keys.clear();
        for (name, rows) in tables.iter() {
            for row in rows {
                keys.insert(Self::row_key(name, row));
            }
        }
        Ok(removed)
    }

    async fn insert_rows(
        &self,
        table: &str,
        rows: &[TargetRow],
    ) -> Result<InsertOutcome, StoreError> {
        if let Some(err) = self.insert_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut tables = self.tables.lock().unwrap();
        let mut keys = self.keys.lock().unwrap();
        let stored = tables.entry(table.to_string()).or_default();

        let mut outcome = InsertOutcome::default();
        for row in rows {
            if keys.insert(Self::row_key(table, row)) {
                stored.push(row.clone());
                outcome.inserted += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }

    async fn save_dataset_progress(
        &self,
        _dataset_id: i64,
        status: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.progress
            .lock()
            .unwrap()
            .push((status.to_string(), metadata.clone()));
        Ok(())
    }
}

/// Sampler that always reports the same reading.
pub struct FlatSampler {
    mb: u64,
}

impl FlatSampler {
    pub fn new(mb: u64) -> Self {
        FlatSampler { mb }
    }
}

impl MemorySampler for FlatSampler {
    fn current_mb(&self) -> u64 {
        self.mb
    }
}

/// Sink that records every published payload.
pub struct CollectingSink {
    payloads: Mutex<Vec<ProgressPayload>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink {
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn payloads(&self) -> Vec<ProgressPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn publish(&self, payload: &ProgressPayload) {
        self.payloads.lock().unwrap().push(payload.clone())
    }
}
