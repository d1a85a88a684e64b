use chrono::{DateTime, Utc};
use model::{job::SyncRequest, progress::ProgressPayload};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where a queued job sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Eligible for the next claim.
    Waiting,
    /// Scheduled for redelivery after a failure.
    Delayed,
    /// Claimed by a worker.
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl QueueState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueState::Completed | QueueState::Failed | QueueState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Waiting => "waiting",
            QueueState::Delayed => "delayed",
            QueueState::Active => "active",
            QueueState::Completed => "completed",
            QueueState::Failed => "failed",
            QueueState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one queued sync. Survives process restarts; the
/// source of truth for status polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub payload: SyncRequest,
    pub state: QueueState,
    /// Higher runs first; ties are FIFO.
    pub priority: u8,
    pub attempts: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub delay_until: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Set when cancellation was requested while the job ran. The
    /// worker observes it at chunk boundaries; recovery honors it
    /// after a crash.
    pub cancel_requested: bool,
    pub progress: Option<ProgressPayload>,
    /// Current wait/delay index key, when the job sits in one.
    pub(crate) slot: Option<String>,
}

impl JobRecord {
    pub(crate) fn new(
        id: Uuid,
        name: String,
        payload: SyncRequest,
        priority: u8,
        max_attempts: u32,
    ) -> Self {
        JobRecord {
            id,
            name,
            payload,
            state: QueueState::Waiting,
            priority,
            attempts: 0,
            max_attempts,
            enqueued_at: Utc::now(),
            delay_until: None,
            started_at: None,
            finished_at: None,
            error: None,
            cancel_requested: false,
            progress: None,
            slot: None,
        }
    }
}
