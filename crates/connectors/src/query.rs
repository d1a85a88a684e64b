use model::{pagination::Cursor, value::Value};
use std::collections::HashMap;

/// A warehouse query that supports cursor pagination: base SQL with
/// `{name}` placeholders, bound values, and the ordering column used
/// for the cursor predicate.
///
/// The base query is wrapped as a derived table, so both the COUNT
/// form and the injected cursor predicate work against any base
/// select without touching its own WHERE clause.
#[derive(Debug, Clone)]
pub struct PagedQuery {
    pub base_sql: String,
    pub params: HashMap<String, Value>,
    pub ordering_column: String,
}

impl PagedQuery {
    pub fn new(base_sql: &str, ordering_column: &str) -> Self {
        PagedQuery {
            base_sql: base_sql.to_string(),
            params: HashMap::new(),
            ordering_column: ordering_column.to_string(),
        }
    }

    pub fn bind(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    fn substituted(&self) -> String {
        let mut sql = self.base_sql.clone();
        for (name, value) in &self.params {
            sql = sql.replace(&format!("{{{name}}}"), &value.to_string());
        }
        sql
    }

    /// Renders one page: `ordering > cursor ORDER BY ordering ASC LIMIT n`,
    /// omitting the predicate for the first page.
    pub fn render_page(&self, cursor: &Cursor, page_size: usize) -> String {
        let base = self.substituted();
        let ord = &self.ordering_column;
        match cursor {
            Cursor::None => {
                format!("SELECT * FROM ({base}) AS src ORDER BY {ord} ASC LIMIT {page_size}")
            }
            Cursor::After(value) => format!(
                "SELECT * FROM ({base}) AS src WHERE {ord} > {value} \
                 ORDER BY {ord} ASC LIMIT {page_size}"
            ),
        }
    }

    /// Renders the COUNT(*) wrapper used for the progress estimate.
    pub fn render_count(&self) -> String {
        format!("SELECT COUNT(*) FROM ({}) AS src", self.substituted())
    }
}
