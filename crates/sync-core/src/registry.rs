use chrono::Utc;
use model::job::{JobKind, JobStatus, SyncJob};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Arena of live sync jobs, keyed by job id.
///
/// Constructed and owned by whoever builds the pipeline, so multiple
/// pipeline instances can coexist (one registry each) instead of
/// sharing ambient process-wide state.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, SyncJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a new job in `Pending` and returns a handle scoped to it.
    pub async fn register(&self, id: Uuid, dataset_id: i64, kind: JobKind) -> JobHandle {
        let job = SyncJob::new(id, dataset_id, kind);
        self.jobs.write().await.insert(id, job);
        JobHandle {
            registry: self.clone(),
            id,
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<SyncJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<SyncJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// True when the dataset already has a non-terminal job — the
    /// registry-level half of duplicate-enqueue protection.
    pub async fn dataset_busy(&self, dataset_id: i64) -> bool {
        self.jobs
            .read()
            .await
            .values()
            .any(|job| job.dataset_id == dataset_id && !job.status.is_terminal())
    }

    pub async fn remove(&self, id: Uuid) -> Option<SyncJob> {
        self.jobs.write().await.remove(&id)
    }

    pub(crate) async fn update<F>(&self, id: Uuid, mutate: F)
    where
        F: FnOnce(&mut SyncJob),
    {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            mutate(job);
            job.last_update = Utc::now();
        }
    }
}

/// Write access to one job's registry entry.
#[derive(Clone)]
pub struct JobHandle {
    registry: JobRegistry,
    id: Uuid,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn snapshot(&self) -> Option<SyncJob> {
        self.registry.get(self.id).await
    }

    pub async fn set_status(&self, status: JobStatus) {
        self.registry
            .update(self.id, |job| {
                job.status = status;
                if status == JobStatus::Running && job.started_at.is_none() {
                    job.started_at = Some(Utc::now());
                }
            })
            .await;
    }

    pub async fn set_error(&self, message: &str) {
        let message = message.to_string();
        self.registry
            .update(self.id, move |job| job.error = Some(message))
            .await;
    }

    pub async fn record_memory(&self, memory_mb: u64) {
        self.registry
            .update(self.id, |job| job.memory_usage_mb = memory_mb)
            .await;
    }

    pub async fn record_progress(
        &self,
        processed: u64,
        total_estimate: Option<u64>,
        progress_percent: Option<f64>,
    ) {
        self.registry
            .update(self.id, |job| {
                job.processed_count = processed;
                job.total_estimate = total_estimate;
                job.progress_percent = progress_percent;
            })
            .await;
    }
}
