use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Dataset {dataset_id} already has a queued or running job")]
    DatasetBusy { dataset_id: i64 },

    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {id} cannot be {action} while {state}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        action: &'static str,
    },

    #[error("Queue storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Failed to encode job record: {0}")]
    Codec(#[from] bincode::Error),
}
