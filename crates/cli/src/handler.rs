use crate::error::CliError;
use async_trait::async_trait;
use connectors::sql::{mysql::MySqlStore, postgres::PgWarehouse};
use model::{
    job::{JobStatus, SyncRequest},
    progress::ProgressPayload,
};
use std::{error::Error, sync::Arc};
use sync_core::{
    governor::{MemoryGovernor, SysinfoSampler},
    metrics::RunMetrics,
    registry::JobRegistry,
    settings::SyncSettings,
};
use sync_engine::{
    mapper::mapper_for,
    orchestrator::{ProgressSink, RunSummary, SyncOrchestrator},
    pager::CursorPager,
    queries::paged_query_for,
    writer::{BatchWriter, WriterConfig},
};
use sync_queue::{
    job::JobRecord,
    worker::{JobHandler, JobOutcome, ProgressUpdater},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Connects both sides and drives one sync run end to end.
pub async fn run_sync(
    request: &SyncRequest,
    settings: &SyncSettings,
    registry: &JobRegistry,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> Result<RunSummary, CliError> {
    let warehouse = Arc::new(
        PgWarehouse::connect(&request.warehouse_url, settings.query_timeout).await?,
    );
    let store = Arc::new(MySqlStore::connect(&request.store_url)?);

    let job = registry
        .register(Uuid::new_v4(), request.dataset_id, request.kind)
        .await;
    let job_id = job.id();
    let governor = Arc::new(MemoryGovernor::new(
        settings.governor.clone(),
        Arc::new(SysinfoSampler::new()),
    ));
    governor.start().await;

    let pager = CursorPager::new(warehouse, paged_query_for(request), settings.page_size);
    let writer = BatchWriter::new(
        store.clone(),
        mapper_for(request.kind),
        WriterConfig::from_settings(settings),
        RunMetrics::new(),
    );
    let orchestrator = SyncOrchestrator::new(
        pager,
        writer,
        governor.clone(),
        store,
        sink,
        job,
        request.dataset_id,
    );

    let result = orchestrator.run(cancel).await;
    governor.stop().await;
    // The summary carries everything callers need; the registry entry
    // would otherwise accumulate across worker jobs.
    registry.remove(job_id).await;
    Ok(result?)
}

/// Queue handler that executes sync jobs through the engine, wiring
/// per-chunk progress back onto the durable job record.
pub struct SyncJobHandler {
    settings: SyncSettings,
    registry: JobRegistry,
}

impl SyncJobHandler {
    pub fn new(settings: SyncSettings) -> Self {
        SyncJobHandler {
            settings,
            registry: JobRegistry::new(),
        }
    }
}

#[async_trait]
impl JobHandler for SyncJobHandler {
    async fn run(
        &self,
        job: &JobRecord,
        progress: ProgressUpdater,
        cancel: CancellationToken,
    ) -> Result<JobOutcome, Box<dyn Error + Send + Sync>> {
        let sink = Arc::new(QueueSink { updater: progress });
        let summary = run_sync(&job.payload, &self.settings, &self.registry, sink, cancel)
            .await
            .map_err(|err| Box::new(err) as Box<dyn Error + Send + Sync>)?;

        Ok(match summary.status {
            JobStatus::Cancelled => JobOutcome::Cancelled,
            _ => JobOutcome::Completed,
        })
    }
}

struct QueueSink {
    updater: ProgressUpdater,
}

#[async_trait]
impl ProgressSink for QueueSink {
    async fn publish(&self, payload: &ProgressPayload) {
        self.updater.update(payload);
    }
}
