use connectors::query::PagedQuery;
use model::{
    job::{JobKind, SyncRequest},
    value::Value,
};

/// Builds the warehouse query for a sync request.
///
/// Ordering is by the record date. The cursor compares dates only, so
/// rows sharing the final date of a page ride along into the next page
/// and are deduplicated by the store's natural-key upsert.
pub fn paged_query_for(request: &SyncRequest) -> PagedQuery {
    let (sql, ordering) = match request.kind {
        JobKind::Forecast => (
            "SELECT product_code, location_code, forecast_date, quantity, model_name \
             FROM demand_forecasts \
             WHERE dataset_id = {dataset_id} AND forecast_date BETWEEN {from} AND {to}",
            "forecast_date",
        ),
        JobKind::Actuals => (
            "SELECT product_code, location_code, sales_date, quantity \
             FROM sales_actuals \
             WHERE dataset_id = {dataset_id} AND sales_date BETWEEN {from} AND {to}",
            "sales_date",
        ),
    };

    PagedQuery::new(sql, ordering)
        .bind("dataset_id", Value::Int(request.dataset_id))
        .bind("from", Value::Date(request.range.from))
        .bind("to", Value::Date(request.range.to))
}
