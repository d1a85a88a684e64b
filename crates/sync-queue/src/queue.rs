use crate::{
    error::QueueError,
    job::{JobRecord, QueueState},
};
use chrono::Utc;
use model::{job::SyncRequest, progress::ProgressPayload};
use std::{path::Path, time::Duration};
use sync_core::retry::{Backoff, RetryPolicy};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts before a job lands in `Failed`.
    pub max_attempts: u32,
    /// Backoff between redeliveries.
    pub redelivery: RetryPolicy,
    /// How long terminal jobs are kept before pruning.
    pub retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            redelivery: RetryPolicy::new(
                3,
                Duration::from_secs(30),
                Duration::from_secs(600),
                Backoff::Exponential,
            ),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

// Key layout:
//   job:{uuid}                          bincode JobRecord
//   wait:{inv_priority}:{nanos}:{uuid}  ready index, lexicographic claim order
//   delay:{due_nanos}:{uuid}            redelivery index
//   claim:{dataset_id}                  dataset-level duplicate guard
fn job_key(id: &Uuid) -> String {
    format!("job:{id}")
}

fn wait_key(priority: u8, seq: i64, id: &Uuid) -> String {
    format!("wait:{:03}:{:020}:{id}", u8::MAX - priority, seq.max(0))
}

fn delay_key(due_nanos: i64, id: &Uuid) -> String {
    format!("delay:{:020}:{id}", due_nanos.max(0))
}

fn claim_key(dataset_id: i64) -> String {
    format!("claim:{dataset_id}")
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

/// Durable job queue over an embedded sled tree.
///
/// Enqueue atomically claims the job's dataset, so at most one
/// non-terminal job exists per dataset no matter how many producers
/// race. Claims release when the job reaches a terminal state; stale
/// claims left by a crash are detected and replaced on the next
/// enqueue.
///
/// Opening the queue also recovers jobs a crashed worker left in
/// `Active`: they requeue with the interrupted attempt counted, fail
/// when no attempts remain, and finalize when cancellation was
/// pending.
#[derive(Clone)]
pub struct JobQueue {
    db: sled::Db,
    config: QueueConfig,
}

impl JobQueue {
    pub fn open(path: impl AsRef<Path>, config: QueueConfig) -> Result<Self, QueueError> {
        let db = sled::open(path)?;
        let queue = JobQueue { db, config };
        queue.recover_interrupted()?;
        Ok(queue)
    }

    /// Requeues jobs stranded in `Active` by a previous process. Sled
    /// is single-process, so any `Active` record seen at open time
    /// belongs to a worker that no longer exists.
    fn recover_interrupted(&self) -> Result<usize, QueueError> {
        let mut recovered = 0;
        for entry in self.db.scan_prefix("job:") {
            let (_, bytes) = entry?;
            let mut job: JobRecord = bincode::deserialize(&bytes)?;
            if job.state != QueueState::Active {
                continue;
            }

            if job.cancel_requested {
                job.state = QueueState::Cancelled;
                job.finished_at = Some(Utc::now());
                self.put(&job)?;
                self.release_claim(job.payload.dataset_id, job.id)?;
            } else if job.attempts >= job.max_attempts {
                job.state = QueueState::Failed;
                job.error = Some("interrupted with no attempts left".to_string());
                job.finished_at = Some(Utc::now());
                self.put(&job)?;
                self.release_claim(job.payload.dataset_id, job.id)?;
            } else {
                // The interrupted claim already counted as an attempt.
                self.push_waiting(&mut job, false)?;
                self.put(&job)?;
            }

            warn!(
                job_id = %job.id,
                state = %job.state,
                attempts = job.attempts,
                "Recovered job interrupted by a previous shutdown"
            );
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Adds a job in `Waiting`, or refuses with `DatasetBusy` when the
    /// dataset already has a live job.
    pub fn enqueue(
        &self,
        name: &str,
        payload: SyncRequest,
        priority: u8,
    ) -> Result<JobRecord, QueueError> {
        let id = Uuid::new_v4();
        self.claim_dataset(payload.dataset_id, id)?;

        let mut job = JobRecord::new(
            id,
            name.to_string(),
            payload,
            priority,
            self.config.max_attempts,
        );
        self.push_waiting(&mut job, false)?;
        self.put(&job)?;
        info!(job_id = %id, name, priority, "Job enqueued");
        Ok(job)
    }

    pub fn get(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        match self.db.get(job_key(&id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(QueueError::NotFound(id)),
        }
    }

    /// All known jobs, newest first.
    pub fn list(&self) -> Result<Vec<JobRecord>, QueueError> {
        let mut jobs = Vec::new();
        for entry in self.db.scan_prefix("job:") {
            let (_, bytes) = entry?;
            jobs.push(bincode::deserialize::<JobRecord>(&bytes)?);
        }
        jobs.sort_by(|a, b| b.enqueued_at.cmp(&a.enqueued_at));
        Ok(jobs)
    }

    /// Cancels a job. Waiting and delayed jobs go terminal here;
    /// active jobs get a durable cancel request and are finalized by
    /// their worker at the next chunk boundary (or by recovery, if
    /// the worker never gets there).
    pub fn cancel(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        let mut job = self.get(id)?;
        match job.state {
            QueueState::Waiting | QueueState::Delayed => {
                if let Some(slot) = job.slot.take() {
                    self.db.remove(slot.as_bytes())?;
                }
                job.state = QueueState::Cancelled;
                job.finished_at = Some(Utc::now());
                self.put(&job)?;
                self.release_claim(job.payload.dataset_id, id)?;
                info!(job_id = %id, "Job cancelled");
                Ok(job)
            }
            QueueState::Active => {
                job.cancel_requested = true;
                self.put(&job)?;
                info!(job_id = %id, "Cancellation requested, job stops at the next chunk boundary");
                Ok(job)
            }
            _ => Err(QueueError::InvalidTransition {
                id,
                state: job.state.to_string(),
                action: "cancelled",
            }),
        }
    }

    /// Requeues a failed job from scratch.
    pub fn retry(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        let mut job = self.get(id)?;
        if job.state != QueueState::Failed {
            return Err(QueueError::InvalidTransition {
                id,
                state: job.state.to_string(),
                action: "retried",
            });
        }

        self.claim_dataset(job.payload.dataset_id, id)?;
        job.attempts = 0;
        job.error = None;
        job.finished_at = None;
        job.delay_until = None;
        job.cancel_requested = false;
        job.progress = None;
        self.push_waiting(&mut job, false)?;
        self.put(&job)?;
        info!(job_id = %id, "Failed job requeued");
        Ok(job)
    }

    /// Moves a delayed job to the front of the waiting line.
    pub fn promote(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        let mut job = self.get(id)?;
        if job.state != QueueState::Delayed {
            return Err(QueueError::InvalidTransition {
                id,
                state: job.state.to_string(),
                action: "promoted",
            });
        }

        if let Some(slot) = job.slot.take() {
            self.db.remove(slot.as_bytes())?;
        }
        job.delay_until = None;
        self.push_waiting(&mut job, true)?;
        self.put(&job)?;
        info!(job_id = %id, "Delayed job promoted");
        Ok(job)
    }

    /// Claims the next waiting job: highest priority first, FIFO
    /// within a priority.
    pub fn claim_next(&self) -> Result<Option<JobRecord>, QueueError> {
        loop {
            let Some(entry) = self.db.scan_prefix("wait:").next() else {
                return Ok(None);
            };
            let (key, value) = entry?;
            self.db.remove(&key)?;

            // Dangling index entries are dropped, not surfaced.
            let Ok(id) = Uuid::from_slice(&value) else {
                continue;
            };
            let mut job = match self.get(id) {
                Ok(job) => job,
                Err(QueueError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            if job.state != QueueState::Waiting {
                continue;
            }

            job.state = QueueState::Active;
            job.attempts += 1;
            job.started_at = Some(Utc::now());
            job.slot = None;
            self.put(&job)?;
            return Ok(Some(job));
        }
    }

    /// Moves delayed jobs whose redelivery time has arrived back into
    /// the waiting line. Returns how many were promoted.
    pub fn promote_due(&self) -> Result<usize, QueueError> {
        let now = now_nanos();
        let mut promoted = 0;

        for entry in self.db.scan_prefix("delay:") {
            let (key, value) = entry?;
            let key_str = String::from_utf8_lossy(&key);
            let due: i64 = key_str
                .split(':')
                .nth(1)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            if due > now {
                // Keys are sorted by due time; nothing further is ripe.
                break;
            }

            self.db.remove(&key)?;
            let Ok(id) = Uuid::from_slice(&value) else {
                continue;
            };
            if let Ok(mut job) = self.get(id) {
                if job.state == QueueState::Delayed {
                    job.delay_until = None;
                    self.push_waiting(&mut job, false)?;
                    self.put(&job)?;
                    promoted += 1;
                }
            }
        }

        if promoted > 0 {
            debug!(promoted, "Redeliveries promoted to waiting");
        }
        Ok(promoted)
    }

    /// Marks an active job completed and releases its dataset claim.
    pub fn finish_success(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        let mut job = self.get(id)?;
        job.state = QueueState::Completed;
        job.finished_at = Some(Utc::now());
        self.put(&job)?;
        self.release_claim(job.payload.dataset_id, id)?;
        Ok(job)
    }

    /// Marks an active job cancelled and releases its dataset claim.
    pub fn finish_cancelled(&self, id: Uuid) -> Result<JobRecord, QueueError> {
        let mut job = self.get(id)?;
        job.state = QueueState::Cancelled;
        job.finished_at = Some(Utc::now());
        self.put(&job)?;
        self.release_claim(job.payload.dataset_id, id)?;
        Ok(job)
    }

    /// Records a failed attempt: schedules a delayed redelivery while
    /// attempts remain, otherwise goes terminal `Failed`.
    pub fn finish_failure(&self, id: Uuid, error: &str) -> Result<JobRecord, QueueError> {
        let mut job = self.get(id)?;
        job.error = Some(error.to_string());

        if job.attempts >= job.max_attempts {
            job.state = QueueState::Failed;
            job.finished_at = Some(Utc::now());
            self.put(&job)?;
            self.release_claim(job.payload.dataset_id, id)?;
            warn!(job_id = %id, attempts = job.attempts, "Job failed permanently");
        } else {
            let delay = self
                .config
                .redelivery
                .backoff_delay(job.attempts.saturating_sub(1) as usize);
            let until = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            let key = delay_key(until.timestamp_nanos_opt().unwrap_or(0), &id);
            self.db.insert(key.as_bytes(), id.as_bytes().to_vec())?;

            job.state = QueueState::Delayed;
            job.delay_until = Some(until);
            job.slot = Some(key);
            self.put(&job)?;
            warn!(
                job_id = %id,
                attempt = job.attempts,
                delay_ms = delay.as_millis() as u64,
                "Job attempt failed, redelivery scheduled"
            );
        }

        Ok(job)
    }

    /// Stores the latest progress snapshot on the record.
    pub fn update_progress(&self, id: Uuid, payload: ProgressPayload) -> Result<(), QueueError> {
        let mut job = self.get(id)?;
        job.progress = Some(payload);
        self.put(&job)
    }

    /// Deletes terminal jobs older than the retention window. Returns
    /// how many were removed.
    pub fn prune(&self) -> Result<usize, QueueError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention)
                .unwrap_or_else(|_| chrono::Duration::zero());
        let mut removed = 0;

        for entry in self.db.scan_prefix("job:") {
            let (key, bytes) = entry?;
            let job: JobRecord = bincode::deserialize(&bytes)?;
            let expired = job.state.is_terminal()
                && job.finished_at.map(|at| at < cutoff).unwrap_or(false);
            if expired {
                if let Some(slot) = &job.slot {
                    self.db.remove(slot.as_bytes())?;
                }
                self.db.remove(&key)?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Pruned terminal jobs past retention");
        }
        Ok(removed)
    }

    fn put(&self, job: &JobRecord) -> Result<(), QueueError> {
        self.db.insert(job_key(&job.id), bincode::serialize(job)?)?;
        Ok(())
    }

    fn push_waiting(&self, job: &mut JobRecord, front: bool) -> Result<(), QueueError> {
        let (priority, seq) = if front {
            (u8::MAX, 0)
        } else {
            (job.priority, now_nanos())
        };
        let key = wait_key(priority, seq, &job.id);
        self.db.insert(key.as_bytes(), job.id.as_bytes().to_vec())?;
        job.slot = Some(key);
        job.state = QueueState::Waiting;
        Ok(())
    }

    fn claim_dataset(&self, dataset_id: i64, id: Uuid) -> Result<(), QueueError> {
        let key = claim_key(dataset_id);
        let proposed = id.as_bytes().to_vec();

        match self
            .db
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(proposed.clone()))?
        {
            Ok(()) => Ok(()),
            Err(cas) => {
                // A claim held by a terminal or vanished job is stale
                // (crash before release); take it over.
                let holder = cas
                    .current
                    .as_ref()
                    .and_then(|bytes| Uuid::from_slice(bytes).ok());
                if let Some(holder) = holder {
                    let stale = match self.get(holder) {
                        Ok(job) => job.state.is_terminal(),
                        Err(QueueError::NotFound(_)) => true,
                        Err(err) => return Err(err),
                    };
                    if stale
                        && self
                            .db
                            .compare_and_swap(key.as_bytes(), cas.current, Some(proposed))?
                            .is_ok()
                    {
                        return Ok(());
                    }
                }
                Err(QueueError::DatasetBusy { dataset_id })
            }
        }
    }

    fn release_claim(&self, dataset_id: i64, id: Uuid) -> Result<(), QueueError> {
        // Only release a claim this job still holds.
        let _ = self.db.compare_and_swap(
            claim_key(dataset_id).as_bytes(),
            Some(id.as_bytes().as_slice()),
            None::<&[u8]>,
        )?;
        Ok(())
    }
}
