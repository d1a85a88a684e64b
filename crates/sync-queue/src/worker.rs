use crate::{error::QueueError, job::JobRecord, queue::JobQueue};
use async_trait::async_trait;
use model::progress::ProgressPayload;
use std::{error::Error, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How a handled job ended, from the handler's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Stopped cooperatively after a cancellation signal.
    Cancelled,
}

/// Executes one claimed job. Errors count as a failed attempt and go
/// through the queue's redelivery schedule.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(
        &self,
        job: &JobRecord,
        progress: ProgressUpdater,
        cancel: CancellationToken,
    ) -> Result<JobOutcome, Box<dyn Error + Send + Sync>>;
}

/// Handed to handlers so per-chunk progress lands on the durable
/// record. Failures are swallowed; progress is telemetry.
#[derive(Clone)]
pub struct ProgressUpdater {
    queue: JobQueue,
    job_id: Uuid,
}

impl ProgressUpdater {
    pub fn update(&self, payload: &ProgressPayload) {
        if let Err(err) = self.queue.update_progress(self.job_id, payload.clone()) {
            warn!(job_id = %self.job_id, %err, "Failed to persist progress on job record");
        }
    }
}

/// Single-consumer worker loop: promote ripe redeliveries, claim the
/// next waiting job, run it, record the outcome. Sleeps between polls
/// when the queue is empty.
pub struct QueueWorker {
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    poll_interval: Duration,
}

impl QueueWorker {
    pub fn new(queue: JobQueue, handler: Arc<dyn JobHandler>) -> Self {
        QueueWorker {
            queue,
            handler,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Queue worker started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let worked = match self.tick(&shutdown).await {
                Ok(worked) => worked,
                Err(err) => {
                    error!(%err, "Queue tick failed");
                    false
                }
            };

            if !worked {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        info!("Queue worker stopped");
    }

    /// One poll cycle. Returns whether a job was executed.
    async fn tick(&self, shutdown: &CancellationToken) -> Result<bool, QueueError> {
        self.queue.promote_due()?;

        let Some(job) = self.queue.claim_next()? else {
            return Ok(false);
        };

        let cancel = shutdown.child_token();
        let watch = self.spawn_cancel_watch(job.id, cancel.clone());
        info!(
            job_id = %job.id,
            name = %job.name,
            attempt = job.attempts,
            "Job claimed"
        );

        let progress = ProgressUpdater {
            queue: self.queue.clone(),
            job_id: job.id,
        };

        match self.handler.run(&job, progress, cancel).await {
            Ok(JobOutcome::Completed) => {
                self.queue.finish_success(job.id)?;
                info!(job_id = %job.id, "Job completed");
            }
            Ok(JobOutcome::Cancelled) => {
                self.queue.finish_cancelled(job.id)?;
                info!(job_id = %job.id, "Job cancelled");
            }
            Err(err) => {
                self.queue.finish_failure(job.id, &err.to_string())?;
            }
        }
        watch.abort();
        Ok(true)
    }

    /// Polls the durable record while the job runs and turns a cancel
    /// request into a token cancellation.
    fn spawn_cancel_watch(
        &self,
        id: Uuid,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match queue.get(id) {
                    Ok(job) if job.cancel_requested => {
                        cancel.cancel();
                        break;
                    }
                    Ok(job) if job.state.is_terminal() => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{job::QueueState, queue::QueueConfig};
    use chrono::NaiveDate;
    use model::job::{DateRange, JobKind, SyncRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sync_core::retry::{Backoff, RetryPolicy};
    use tempfile::tempdir;

    fn request(dataset_id: i64) -> SyncRequest {
        SyncRequest {
            dataset_id,
            kind: JobKind::Actuals,
            warehouse_url: "postgres://wh".into(),
            store_url: "mysql://store".into(),
            range: DateRange {
                from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            },
        }
    }

    fn fast_queue(dir: &tempfile::TempDir) -> JobQueue {
        JobQueue::open(
            dir.path(),
            QueueConfig {
                max_attempts: 3,
                redelivery: RetryPolicy::new(
                    3,
                    Duration::from_millis(1),
                    Duration::from_millis(5),
                    Backoff::Exponential,
                ),
                retention: Duration::from_secs(3600),
            },
        )
        .unwrap()
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    struct CountingHandler {
        calls: AtomicUsize,
        outcome: fn(usize) -> Result<JobOutcome, Box<dyn Error + Send + Sync>>,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(
            &self,
            _job: &JobRecord,
            _progress: ProgressUpdater,
            _cancel: CancellationToken,
        ) -> Result<JobOutcome, Box<dyn Error + Send + Sync>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)(n)
        }
    }

    #[tokio::test]
    async fn worker_runs_jobs_to_completion() {
        let dir = tempdir().unwrap();
        let queue = fast_queue(&dir);
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            outcome: |_| Ok(JobOutcome::Completed),
        });

        let shutdown = CancellationToken::new();
        let worker_queue = queue.clone();
        let worker_handler = handler.clone();
        let worker_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            QueueWorker::new(worker_queue, worker_handler)
                .with_poll_interval(Duration::from_millis(5))
                .run(worker_shutdown)
                .await;
        });

        let job = queue.enqueue("sync", request(1), 0).unwrap();
        let poll_queue = queue.clone();
        wait_for(move || {
            poll_queue
                .get(job.id)
                .map(|j| j.state == QueueState::Completed)
                .unwrap_or(false)
        })
        .await;

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_jobs_exhaust_attempts_and_fail() {
        let dir = tempdir().unwrap();
        let queue = fast_queue(&dir);
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            outcome: |_| Err("warehouse unreachable".into()),
        });

        let shutdown = CancellationToken::new();
        let worker_queue = queue.clone();
        let worker_handler = handler.clone();
        let worker_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            QueueWorker::new(worker_queue, worker_handler)
                .with_poll_interval(Duration::from_millis(5))
                .run(worker_shutdown)
                .await;
        });

        let job = queue.enqueue("sync", request(1), 0).unwrap();
        let poll_queue = queue.clone();
        wait_for(move || {
            poll_queue
                .get(job.id)
                .map(|j| j.state == QueueState::Failed)
                .unwrap_or(false)
        })
        .await;

        shutdown.cancel();
        handle.await.unwrap();

        let record = queue.get(job.id).unwrap();
        assert_eq!(record.attempts, 3);
        assert_eq!(record.error.as_deref(), Some("warehouse unreachable"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn second_attempt_can_recover() {
        let dir = tempdir().unwrap();
        let queue = fast_queue(&dir);
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            outcome: |n| {
                if n == 0 {
                    Err("transient".into())
                } else {
                    Ok(JobOutcome::Completed)
                }
            },
        });

        let shutdown = CancellationToken::new();
        let worker_queue = queue.clone();
        let worker_handler = handler.clone();
        let worker_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            QueueWorker::new(worker_queue, worker_handler)
                .with_poll_interval(Duration::from_millis(5))
                .run(worker_shutdown)
                .await;
        });

        let job = queue.enqueue("sync", request(1), 0).unwrap();
        let poll_queue = queue.clone();
        wait_for(move || {
            poll_queue
                .get(job.id)
                .map(|j| j.state == QueueState::Completed)
                .unwrap_or(false)
        })
        .await;

        shutdown.cancel();
        handle.await.unwrap();

        let record = queue.get(job.id).unwrap();
        assert_eq!(record.attempts, 2);
    }

    struct BlockingHandler;

    #[async_trait]
    impl JobHandler for BlockingHandler {
        async fn run(
            &self,
            _job: &JobRecord,
            _progress: ProgressUpdater,
            cancel: CancellationToken,
        ) -> Result<JobOutcome, Box<dyn Error + Send + Sync>> {
            cancel.cancelled().await;
            Ok(JobOutcome::Cancelled)
        }
    }

    #[tokio::test]
    async fn active_jobs_cancel_through_the_queue() {
        let dir = tempdir().unwrap();
        let queue = fast_queue(&dir);

        let shutdown = CancellationToken::new();
        let worker_queue = queue.clone();
        let worker_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            QueueWorker::new(worker_queue, Arc::new(BlockingHandler))
                .with_poll_interval(Duration::from_millis(5))
                .run(worker_shutdown)
                .await;
        });

        let job = queue.enqueue("sync", request(1), 0).unwrap();
        let poll_queue = queue.clone();
        let active_id = job.id;
        wait_for(move || {
            poll_queue
                .get(active_id)
                .map(|j| j.state == QueueState::Active)
                .unwrap_or(false)
        })
        .await;

        queue.cancel(job.id).unwrap();
        let poll_queue = queue.clone();
        wait_for(move || {
            poll_queue
                .get(active_id)
                .map(|j| j.state == QueueState::Cancelled)
                .unwrap_or(false)
        })
        .await;

        shutdown.cancel();
        handle.await.unwrap();
        // Dataset freed after cooperative cancellation.
        queue.enqueue("sync-2", request(1), 0).unwrap();
    }
}
