use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which kind of records a sync moves; selects the record mapper and
/// the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Forecast,
    Actuals,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Forecast => "forecast",
            JobKind::Actuals => "actuals",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date window a sync covers on the warehouse side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Payload accepted at enqueue time; everything a worker needs to run
/// the sync end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub dataset_id: i64,
    pub kind: JobKind,
    pub warehouse_url: String,
    pub store_url: String,
    pub range: DateRange,
}

/// Live state of one sync run, mutated by the orchestrator on every
/// chunk and read by pollers through the registry.
#[derive(Debug, Clone, Serialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub dataset_id: i64,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress_percent: Option<f64>,
    pub total_estimate: Option<u64>,
    pub processed_count: u64,
    pub memory_usage_mb: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_update: DateTime<Utc>,
    pub error: Option<String>,
}

impl SyncJob {
    pub fn new(id: Uuid, dataset_id: i64, kind: JobKind) -> Self {
        SyncJob {
            id,
            dataset_id,
            kind,
            status: JobStatus::Pending,
            progress_percent: None,
            total_estimate: None,
            processed_count: 0,
            memory_usage_mb: 0,
            started_at: None,
            last_update: Utc::now(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
    }

    #[test]
    fn request_round_trips_through_json() {
        let req = SyncRequest {
            dataset_id: 7,
            kind: JobKind::Actuals,
            warehouse_url: "postgres://wh".into(),
            store_url: "mysql://store".into(),
            range: DateRange {
                from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: SyncRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dataset_id, 7);
        assert_eq!(back.kind, JobKind::Actuals);
        assert_eq!(back.range.to, req.range.to);
    }
}
