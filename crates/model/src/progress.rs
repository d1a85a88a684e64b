use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Telemetry snapshot pushed to pollers after every chunk.
///
/// `progress` is absent when the initial COUNT estimate failed; raw
/// processed counts are still reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub job_id: Uuid,
    pub total_count: Option<u64>,
    pub processed_count: u64,
    pub progress: Option<f64>,
    pub memory_usage_mb: u64,
    pub records_per_second: f64,
    pub elapsed_time_seconds: f64,
    pub estimated_remaining_time_ms: Option<u64>,
    pub estimated_finish_time: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
}

impl ProgressPayload {
    /// Computes a snapshot from raw counters. Rate and ETA degrade to
    /// zero/absent instead of dividing by zero on the first chunk.
    pub fn compute(
        job_id: Uuid,
        total_count: Option<u64>,
        processed_count: u64,
        elapsed_seconds: f64,
        memory_usage_mb: u64,
    ) -> Self {
        let records_per_second = if elapsed_seconds > 0.0 {
            processed_count as f64 / elapsed_seconds
        } else {
            0.0
        };

        let progress = total_count.filter(|t| *t > 0).map(|total| {
            let pct = processed_count as f64 / total as f64 * 100.0;
            pct.min(100.0)
        });

        let estimated_remaining_time_ms = total_count.and_then(|total| {
            if records_per_second > 0.0 {
                let remaining = total.saturating_sub(processed_count);
                Some((remaining as f64 / records_per_second * 1000.0) as u64)
            } else {
                None
            }
        });

        let now = Utc::now();
        let estimated_finish_time = estimated_remaining_time_ms
            .map(|ms| now + chrono::Duration::milliseconds(ms as i64));

        ProgressPayload {
            job_id,
            total_count,
            processed_count,
            progress,
            memory_usage_mb,
            records_per_second,
            elapsed_time_seconds: elapsed_seconds,
            estimated_remaining_time_ms,
            estimated_finish_time,
            last_update: now,
        }
    }
}
