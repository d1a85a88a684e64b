use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position within a warehouse result set, tracked as the last-seen
/// value of the ordering column.
///
/// This is a coarse single-column cursor: rows sharing the exact
/// ordering value across a page boundary can be skipped on the next
/// page. For date-grained ordering columns that loss is accepted; a
/// composite (date, stable id) cursor would close the gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cursor {
    /// No position yet; the first page is fetched without a predicate.
    None,
    /// Fetch rows strictly after this ordering value.
    After(Value),
}

impl Cursor {
    pub fn is_none(&self) -> bool {
        matches!(self, Cursor::None)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::None => write!(f, "start"),
            Cursor::After(v) => write!(f, "after {v}"),
        }
    }
}
