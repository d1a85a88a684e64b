use crate::{error::WarehouseError, query::PagedQuery, warehouse::Page};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::{
    pagination::Cursor,
    records::WarehouseRow,
    value::{FieldValue, Value},
};
use std::time::Duration;
use tokio_postgres::{Client, NoTls, Row, types::Type};
use tracing::{debug, error};

/// Warehouse adapter over a Postgres-dialect query engine.
pub struct PgWarehouse {
    client: Client,
    query_timeout: Duration,
}

impl PgWarehouse {
    pub async fn connect(url: &str, query_timeout: Duration) -> Result<Self, WarehouseError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| WarehouseError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(%err, "Warehouse connection error");
            }
        });

        Ok(PgWarehouse {
            client,
            query_timeout,
        })
    }

    async fn query_with_timeout(&self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        debug!(sql, "Executing warehouse query");
        match tokio::time::timeout(self.query_timeout, self.client.query(sql, &[])).await {
            Ok(result) => result.map_err(|e| WarehouseError::Query(e.to_string())),
            Err(_) => Err(WarehouseError::QueryTimeout {
                timeout_ms: self.query_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl crate::warehouse::WarehouseSource for PgWarehouse {
    async fn fetch_page(
        &self,
        query: &PagedQuery,
        cursor: &Cursor,
        page_size: usize,
    ) -> Result<Page, WarehouseError> {
        let sql = query.render_page(cursor, page_size);
        let rows = self.query_with_timeout(&sql).await?;
        let decoded = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            rows: decoded,
            requested: page_size,
        })
    }

    async fn count(&self, query: &PagedQuery) -> Result<u64, WarehouseError> {
        let sql = query.render_count();
        let rows = self.query_with_timeout(&sql).await?;
        let row = rows
            .first()
            .ok_or_else(|| WarehouseError::Query("COUNT returned no rows".to_string()))?;
        let count: i64 = row.try_get(0).map_err(|e| WarehouseError::Query(e.to_string()))?;
        Ok(count.max(0) as u64)
    }
}

fn decode_row(row: &Row) -> Result<WarehouseRow, WarehouseError> {
    let mut fields = Vec::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, col.name(), col.type_())?;
        fields.push(FieldValue::new(col.name(), value));
    }
    Ok(WarehouseRow::new(fields))
}

fn decode_column(
    row: &Row,
    idx: usize,
    name: &str,
    ty: &Type,
) -> Result<Value, WarehouseError> {
    let decode_err = || WarehouseError::Decode {
        column: name.to_string(),
        ty: ty.to_string(),
    };

    let value = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map_err(|_| decode_err())?
            .map(|v| Value::Int(v as i64))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map_err(|_| decode_err())?
            .map(|v| Value::Int(v as i64))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .map_err(|_| decode_err())?
            .map(Value::Int)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map_err(|_| decode_err())?
            .map(|v| Value::Float(v as f64))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map_err(|_| decode_err())?
            .map(Value::Float)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
        row.try_get::<_, Option<String>>(idx)
            .map_err(|_| decode_err())?
            .map(Value::String)
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .map_err(|_| decode_err())?
            .map(Value::Boolean)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx)
            .map_err(|_| decode_err())?
            .map(Value::Date)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(|_| decode_err())?
            .map(Value::Timestamp)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx)
            .map_err(|_| decode_err())?
            .map(|v| Value::Timestamp(v.and_utc()))
    } else {
        return Err(decode_err());
    };

    Ok(value.unwrap_or(Value::Null))
}
