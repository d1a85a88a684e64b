use crate::{
    error::StoreError,
    store::{InsertOutcome, TargetStore},
};
use async_trait::async_trait;
use model::{records::TargetRow, value::Value};
use mysql_async::{Opts, Pool, prelude::Queryable};
use tracing::debug;

/// Transactional-store adapter over MySQL. Writes rely on
/// `INSERT IGNORE` against the natural-key unique index, so retries
/// and redeliveries never duplicate rows.
pub struct MySqlStore {
    pool: Pool,
}

impl MySqlStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let opts = Opts::from_url(url).map_err(|e| StoreError::Connect(e.to_string()))?;
        Ok(MySqlStore {
            pool: Pool::new(opts),
        })
    }

    pub async fn disconnect(self) -> Result<(), StoreError> {
        self.pool.disconnect().await.map_err(StoreError::from)
    }

    fn insert_sql(table: &str, rows: &[TargetRow]) -> String {
        let columns = rows[0]
            .columns
            .iter()
            .map(|c| format!("`{c}`"))
            .collect::<Vec<_>>()
            .join(", ");

        let values = rows
            .iter()
            .map(|row| {
                let rendered = row
                    .values
                    .iter()
                    .map(Self::literal)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({rendered})")
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!("INSERT IGNORE INTO `{table}` ({columns}) VALUES {values}")
    }

    /// MySQL treats backslashes inside quoted literals as escape
    /// characters, so they get doubled on top of the standard
    /// rendering.
    fn literal(value: &Value) -> String {
        match value {
            Value::String(v) => format!("'{}'", v.replace('\\', "\\\\").replace('\'', "''")),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl TargetStore for MySqlStore {
    async fn delete_dataset_rows(&self, table: &str, dataset_id: i64) -> Result<u64, StoreError> {
        let mut conn = self.pool.get_conn().await?;
        let sql = format!("DELETE FROM `{table}` WHERE dataset_id = {dataset_id}");
        conn.query_drop(&sql).await?;
        let deleted = conn.affected_rows();
        debug!(table, dataset_id, deleted, "Cleared dataset scope");
        Ok(deleted)
    }

    async fn insert_rows(
        &self,
        table: &str,
        rows: &[TargetRow],
    ) -> Result<InsertOutcome, StoreError> {
        if rows.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let sql = Self::insert_sql(table, rows);
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(&sql).await?;

        // INSERT IGNORE reports only the rows it actually inserted.
        let inserted = conn.affected_rows();
        let skipped = rows.len() as u64 - inserted.min(rows.len() as u64);
        Ok(InsertOutcome { inserted, skipped })
    }

    async fn save_dataset_progress(
        &self,
        dataset_id: i64,
        status: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let status_lit = Self::literal(&Value::String(status.to_string()));
        let metadata_lit = Self::literal(&Value::String(metadata.to_string()));
        let sql = format!(
            "UPDATE datasets SET sync_status = {status_lit}, sync_metadata = {metadata_lit}, \
             updated_at = UTC_TIMESTAMP() WHERE id = {dataset_id}"
        );

        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(&sql).await?;
        Ok(())
    }
}
