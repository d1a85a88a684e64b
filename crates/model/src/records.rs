use crate::{
    pagination::Cursor,
    value::{FieldValue, Value},
};
use serde::{Deserialize, Serialize};

/// A raw row as returned by the warehouse, before mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseRow {
    pub field_values: Vec<FieldValue>,
}

impl WarehouseRow {
    pub fn new(field_values: Vec<FieldValue>) -> Self {
        WarehouseRow { field_values }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }

    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .map(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }
}

/// A mapped row destined for one target table. `columns` and `values`
/// are parallel; every row produced by one mapper carries the same
/// column list, which the store relies on when it builds a bulk insert.
#[derive(Debug, Clone)]
pub struct TargetRow {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl TargetRow {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        TargetRow { columns, values }
    }
}

/// One page of records retrieved by the cursor pager in a single round
/// trip. Handed to the batch writer and never retained afterwards.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub rows: Vec<WarehouseRow>,
    /// Cursor that produced this page.
    pub cursor: Cursor,
    /// Resume-from cursor (ordering value of the last row).
    pub next: Cursor,
    pub page_no: usize,
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}
