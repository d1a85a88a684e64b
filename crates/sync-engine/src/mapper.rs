use crate::error::MappingError;
use chrono::NaiveDate;
use model::{
    job::JobKind,
    records::{TargetRow, WarehouseRow},
    value::Value,
};
use std::sync::Arc;

/// Column widths on the store side. Longer source values are
/// truncated, not rejected.
const MAX_CODE_LEN: usize = 64;
const MAX_MODEL_NAME_LEN: usize = 128;

/// Maps one warehouse row to a row in the kind's target table.
///
/// A mapper is pure per-record translation; it never touches the
/// store. Failures mean the record is dropped and counted.
pub trait RecordMapper: Send + Sync {
    /// Target table every mapped row lands in.
    fn table(&self) -> &'static str;

    fn map(&self, dataset_id: i64, row: &WarehouseRow) -> Result<TargetRow, MappingError>;
}

/// Picks the mapper for a job kind.
pub fn mapper_for(kind: JobKind) -> Arc<dyn RecordMapper> {
    match kind {
        JobKind::Forecast => Arc::new(ForecastMapper),
        JobKind::Actuals => Arc::new(ActualsMapper),
    }
}

fn truncated(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        s
    } else {
        s.chars().take(max).collect()
    }
}

fn required_code(row: &WarehouseRow, field: &str) -> Result<String, MappingError> {
    row.get_value(field)
        .as_string()
        .filter(|s| !s.trim().is_empty())
        .map(|s| truncated(s, MAX_CODE_LEN))
        .ok_or_else(|| MappingError::MissingField {
            field: field.to_string(),
        })
}

fn required_date(row: &WarehouseRow, field: &str) -> Result<NaiveDate, MappingError> {
    let value = row.get_value(field);
    if value.is_null() {
        return Err(MappingError::MissingField {
            field: field.to_string(),
        });
    }
    value.as_date().ok_or_else(|| MappingError::InvalidDate {
        field: field.to_string(),
        value: value.as_string().unwrap_or_default(),
    })
}

/// Quantities are forced numeric; junk becomes zero rather than
/// dropping the record.
fn quantity(row: &WarehouseRow) -> f64 {
    row.get_value("quantity").as_f64().unwrap_or(0.0)
}

/// Forecast records: keyed by product, location and forecast date,
/// with the generating model's name carried along when present.
pub struct ForecastMapper;

impl RecordMapper for ForecastMapper {
    fn table(&self) -> &'static str {
        "forecast_records"
    }

    fn map(&self, dataset_id: i64, row: &WarehouseRow) -> Result<TargetRow, MappingError> {
        let model_name = row
            .get_value("model_name")
            .as_string()
            .map(|s| Value::String(truncated(s, MAX_MODEL_NAME_LEN)))
            .unwrap_or(Value::Null);

        Ok(TargetRow::new(
            vec![
                "dataset_id".into(),
                "product_code".into(),
                "location_code".into(),
                "forecast_date".into(),
                "quantity".into(),
                "model_name".into(),
            ],
            vec![
                Value::Int(dataset_id),
                Value::String(required_code(row, "product_code")?),
                Value::String(required_code(row, "location_code")?),
                Value::Date(required_date(row, "forecast_date")?),
                Value::Float(quantity(row)),
                model_name,
            ],
        ))
    }
}

/// Actual sales records: same key shape as forecasts but dated by the
/// sale, with no model attribution.
pub struct ActualsMapper;

impl RecordMapper for ActualsMapper {
    fn table(&self) -> &'static str {
        "actual_records"
    }

    fn map(&self, dataset_id: i64, row: &WarehouseRow) -> Result<TargetRow, MappingError> {
        Ok(TargetRow::new(
            vec![
                "dataset_id".into(),
                "product_code".into(),
                "location_code".into(),
                "sales_date".into(),
                "quantity".into(),
            ],
            vec![
                Value::Int(dataset_id),
                Value::String(required_code(row, "product_code")?),
                Value::String(required_code(row, "location_code")?),
                Value::Date(required_date(row, "sales_date")?),
                Value::Float(quantity(row)),
            ],
        ))
    }
}
