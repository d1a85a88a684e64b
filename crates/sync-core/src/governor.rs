use crate::registry::JobHandle;
use model::job::JobStatus;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};
use sysinfo::System;
use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of process memory readings. Separated from the governor so
/// tests can simulate pressure without allocating.
pub trait MemorySampler: Send + Sync {
    fn current_mb(&self) -> u64;

    /// Hook invoked when the ceiling is crossed, for samplers that can
    /// trigger a manual reclamation. No-op by default.
    fn reclaim(&self) {}
}

/// Process-RSS sampler backed by sysinfo.
pub struct SysinfoSampler {
    sys: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        SysinfoSampler {
            sys: Mutex::new(System::new_all()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for SysinfoSampler {
    fn current_mb(&self) -> u64 {
        let Ok(mut sys) = self.sys.lock() else {
            return 0;
        };
        sys.refresh_all();

        let Ok(pid) = sysinfo::get_current_pid() else {
            return 0;
        };
        sys.process(pid)
            .map(|proc| proc.memory() / 1024 / 1024)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Ceiling the pipeline tries to stay under, in megabytes.
    pub ceiling_mb: u64,
    /// Ingestion resumes once usage falls under `resume_ratio × ceiling`.
    pub resume_ratio: f64,
    /// Delay between samples while paused.
    pub poll_interval: Duration,
    /// Background sampling interval while running.
    pub sample_interval: Duration,
    /// Upper bound on a single pause; after this the pipeline resumes
    /// anyway instead of deadlocking on a reading that never drops.
    pub max_pause: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            ceiling_mb: 400,
            resume_ratio: 0.8,
            poll_interval: Duration::from_millis(500),
            sample_interval: Duration::from_secs(5),
            max_pause: Duration::from_secs(60),
        }
    }
}

/// Throttles ingestion when process memory crosses the configured
/// ceiling. Explicit object with an owned start/stop lifecycle; the
/// contract is advisory, checked between chunks, never within one.
pub struct MemoryGovernor {
    config: GovernorConfig,
    sampler: Arc<dyn MemorySampler>,
    current_mb: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

impl MemoryGovernor {
    pub fn new(config: GovernorConfig, sampler: Arc<dyn MemorySampler>) -> Self {
        MemoryGovernor {
            config,
            sampler,
            current_mb: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            task: AsyncMutex::new(None),
        }
    }

    /// Starts the background sampling task. Idempotent.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let sampler = self.sampler.clone();
        let current = self.current_mb.clone();
        let interval = self.config.sample_interval;
        let cancel = self.cancel.clone();

        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let mb = sampler.current_mb();
                        current.store(mb, Ordering::Relaxed);
                        debug!(memory_mb = mb, "Sampled process memory");
                    }
                }
            }
        }));
    }

    /// Stops the sampling task and waits for it to finish.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Latest background reading, in megabytes.
    pub fn current_mb(&self) -> u64 {
        self.current_mb.load(Ordering::Relaxed)
    }

    fn sample_now(&self) -> u64 {
        let mb = self.sampler.current_mb();
        self.current_mb.store(mb, Ordering::Relaxed);
        mb
    }

    fn resume_threshold_mb(&self) -> u64 {
        (self.config.ceiling_mb as f64 * self.config.resume_ratio) as u64
    }

    /// Checks memory at a chunk boundary, pausing the job while usage
    /// stays above the ceiling. Returns the latest reading so the
    /// caller can publish it as telemetry. A cancelled run leaves the
    /// pause immediately; the caller finalizes the job.
    pub async fn throttle(&self, job: &JobHandle, cancel: &CancellationToken) -> u64 {
        let mut usage = self.sample_now();
        job.record_memory(usage).await;

        if usage <= self.config.ceiling_mb {
            return usage;
        }

        warn!(
            job_id = %job.id(),
            memory_mb = usage,
            ceiling_mb = self.config.ceiling_mb,
            "Memory ceiling exceeded, pausing ingestion"
        );
        job.set_status(JobStatus::Paused).await;
        self.sampler.reclaim();

        let resume_below = self.resume_threshold_mb();
        let deadline = Instant::now() + self.config.max_pause;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(
                        job_id = %job.id(),
                        memory_mb = usage,
                        "Cancellation requested during pause"
                    );
                    return usage;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
            usage = self.sample_now();
            job.record_memory(usage).await;

            if usage < resume_below {
                info!(
                    job_id = %job.id(),
                    memory_mb = usage,
                    "Memory pressure relieved, resuming ingestion"
                );
                break;
            }

            if Instant::now() >= deadline {
                warn!(
                    job_id = %job.id(),
                    memory_mb = usage,
                    waited_secs = self.config.max_pause.as_secs(),
                    "Maximum pause elapsed, resuming despite memory pressure"
                );
                break;
            }
        }

        job.set_status(JobStatus::Running).await;
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::JobRegistry;
    use model::job::JobKind;
    use std::collections::VecDeque;
    use uuid::Uuid;

    /// Replays a scripted sequence of readings, repeating the last one.
    struct ScriptedSampler {
        readings: Mutex<VecDeque<u64>>,
        last: AtomicU64,
    }

    impl ScriptedSampler {
        fn new(readings: &[u64]) -> Self {
            ScriptedSampler {
                readings: Mutex::new(readings.iter().copied().collect()),
                last: AtomicU64::new(*readings.last().unwrap_or(&0)),
            }
        }
    }

    impl MemorySampler for ScriptedSampler {
        fn current_mb(&self) -> u64 {
            match self.readings.lock().unwrap().pop_front() {
                Some(mb) => {
                    self.last.store(mb, Ordering::Relaxed);
                    mb
                }
                None => self.last.load(Ordering::Relaxed),
            }
        }
    }

    fn fast_config(ceiling_mb: u64, max_pause: Duration) -> GovernorConfig {
        GovernorConfig {
            ceiling_mb,
            resume_ratio: 0.8,
            poll_interval: Duration::from_millis(1),
            sample_interval: Duration::from_millis(5),
            max_pause,
        }
    }

    #[tokio::test]
    async fn below_ceiling_does_not_pause() {
        let registry = JobRegistry::new();
        let job = registry.register(Uuid::new_v4(), 1, JobKind::Forecast).await;
        job.set_status(JobStatus::Running).await;

        let governor = MemoryGovernor::new(
            fast_config(400, Duration::from_secs(1)),
            Arc::new(ScriptedSampler::new(&[120])),
        );

        let usage = governor.throttle(&job, &CancellationToken::new()).await;
        assert_eq!(usage, 120);
        assert_eq!(job.snapshot().await.unwrap().status, JobStatus::Running);
        assert_eq!(job.snapshot().await.unwrap().memory_usage_mb, 120);
    }

    #[tokio::test]
    async fn pauses_then_resumes_when_pressure_drops() {
        let registry = JobRegistry::new();
        let job = registry.register(Uuid::new_v4(), 1, JobKind::Forecast).await;
        job.set_status(JobStatus::Running).await;

        // Over the 400MB ceiling, then above the 320MB resume line,
        // then below it.
        let governor = MemoryGovernor::new(
            fast_config(400, Duration::from_secs(5)),
            Arc::new(ScriptedSampler::new(&[500, 450, 300])),
        );

        let usage = governor.throttle(&job, &CancellationToken::new()).await;
        assert_eq!(usage, 300);
        let job = job.snapshot().await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.memory_usage_mb, 300);
    }

    #[tokio::test]
    async fn resumes_after_max_pause_even_under_pressure() {
        let registry = JobRegistry::new();
        let job = registry.register(Uuid::new_v4(), 1, JobKind::Actuals).await;
        job.set_status(JobStatus::Running).await;

        let governor = MemoryGovernor::new(
            fast_config(400, Duration::from_millis(5)),
            Arc::new(ScriptedSampler::new(&[900])),
        );

        let usage = governor.throttle(&job, &CancellationToken::new()).await;
        assert!(usage > 400, "reading never dropped");
        assert_eq!(job.snapshot().await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pause() {
        let registry = JobRegistry::new();
        let job = registry.register(Uuid::new_v4(), 1, JobKind::Forecast).await;
        job.set_status(JobStatus::Running).await;

        // Pressure never relieves and the pause cap is far away; only
        // cancellation can end the wait quickly.
        let governor = MemoryGovernor::new(
            fast_config(400, Duration::from_secs(60)),
            Arc::new(ScriptedSampler::new(&[900])),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        let usage = tokio::time::timeout(
            Duration::from_secs(1),
            governor.throttle(&job, &cancel),
        )
        .await
        .expect("pause did not observe cancellation");

        assert_eq!(usage, 900);
        // The caller finalizes the job status after a cancelled pause.
        assert_eq!(job.snapshot().await.unwrap().status, JobStatus::Paused);
    }

    #[tokio::test]
    async fn background_task_publishes_readings() {
        let governor = MemoryGovernor::new(
            fast_config(400, Duration::from_secs(1)),
            Arc::new(ScriptedSampler::new(&[64])),
        );

        governor.start().await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        governor.stop().await;

        assert_eq!(governor.current_mb(), 64);
    }
}
