use crate::{
    commands::{Commands, SyncArgs, TuningArgs},
    error::CliError,
    handler::SyncJobHandler,
    shutdown::{INTERRUPTED_EXIT_CODE, ShutdownCoordinator},
};
use chrono::NaiveDate;
use clap::Parser;
use model::job::{DateRange, JobKind, JobStatus, SyncRequest};
use std::{str::FromStr, sync::Arc, time::Duration};
use sync_core::{registry::JobRegistry, settings::SyncSettings};
use sync_engine::orchestrator::NoopSink;
use sync_queue::{
    job::QueueState,
    queue::{JobQueue, QueueConfig},
    worker::QueueWorker,
};
use tracing::Level;
use uuid::Uuid;

mod commands;
mod error;
mod handler;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "datasync",
    version = "0.1.0",
    about = "Warehouse-to-store dataset sync"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".datasync/queue",
        help = "Path of the queue database"
    )]
    queue_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // Initialize logger
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { sync, tuning, json } => {
            let request = build_request(&sync)?;
            let settings = settings_from(&tuning);

            let shutdown = ShutdownCoordinator::install();

            let registry = JobRegistry::new();
            let summary = handler::run_sync(
                &request,
                &settings,
                &registry,
                Arc::new(NoopSink),
                shutdown.token(),
            )
            .await?;
            output::print_summary(&summary, json)?;

            if summary.status == JobStatus::Cancelled {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
        Commands::Enqueue { sync, priority } => {
            let request = build_request(&sync)?;
            let queue = open_queue(&cli.queue_path)?;
            let name = format!("{}-{}", request.kind, request.dataset_id);
            let job = queue.enqueue(&name, request, priority)?;
            println!("Enqueued job {}", job.id);
        }
        Commands::Worker { tuning, poll_ms } => {
            let queue = open_queue(&cli.queue_path)?;
            queue.prune()?;

            let shutdown = ShutdownCoordinator::install();

            let handler = Arc::new(SyncJobHandler::new(settings_from(&tuning)));
            QueueWorker::new(queue, handler)
                .with_poll_interval(Duration::from_millis(poll_ms))
                .run(shutdown.token())
                .await;

            if shutdown.interrupted() {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
        Commands::Status { id, json } => {
            let queue = open_queue(&cli.queue_path)?;
            let job = queue.get(parse_id(&id)?)?;
            output::print_job(&job, json)?;
        }
        Commands::Jobs { state, json } => {
            let queue = open_queue(&cli.queue_path)?;
            let mut jobs = queue.list()?;
            if let Some(state) = state {
                let state = parse_state(&state)?;
                jobs.retain(|job| job.state == state);
            }
            output::print_jobs(&jobs, json)?;
        }
        Commands::Cancel { id } => {
            let queue = open_queue(&cli.queue_path)?;
            let job = queue.cancel(parse_id(&id)?)?;
            if job.state == QueueState::Active {
                println!("Cancellation requested for job {}", job.id);
            } else {
                println!("Job {} is now {}", job.id, job.state);
            }
        }
        Commands::Retry { id } => {
            let queue = open_queue(&cli.queue_path)?;
            let job = queue.retry(parse_id(&id)?)?;
            println!("Job {} requeued", job.id);
        }
        Commands::Promote { id } => {
            let queue = open_queue(&cli.queue_path)?;
            let job = queue.promote(parse_id(&id)?)?;
            println!("Job {} promoted to the front of the queue", job.id);
        }
        Commands::Prune => {
            let queue = open_queue(&cli.queue_path)?;
            let removed = queue.prune()?;
            println!("Removed {removed} terminal job(s)");
        }
    }

    Ok(())
}

fn open_queue(path: &str) -> Result<JobQueue, CliError> {
    Ok(JobQueue::open(path, QueueConfig::default())?)
}

fn parse_id(raw: &str) -> Result<Uuid, CliError> {
    Uuid::from_str(raw).map_err(|_| CliError::InvalidJobId(raw.to_string()))
}

fn parse_state(raw: &str) -> Result<QueueState, CliError> {
    match raw.to_ascii_lowercase().as_str() {
        "waiting" => Ok(QueueState::Waiting),
        "delayed" => Ok(QueueState::Delayed),
        "active" => Ok(QueueState::Active),
        "completed" => Ok(QueueState::Completed),
        "failed" => Ok(QueueState::Failed),
        "cancelled" => Ok(QueueState::Cancelled),
        _ => Err(CliError::InvalidState(raw.to_string())),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| CliError::InvalidDate(raw.to_string()))
}

fn build_request(args: &SyncArgs) -> Result<SyncRequest, CliError> {
    let kind = match args.kind.to_ascii_lowercase().as_str() {
        "forecast" => JobKind::Forecast,
        "actuals" => JobKind::Actuals,
        _ => return Err(CliError::InvalidKind(args.kind.clone())),
    };

    Ok(SyncRequest {
        dataset_id: args.dataset_id,
        kind,
        warehouse_url: args.warehouse_url.clone(),
        store_url: args.store_url.clone(),
        range: DateRange {
            from: parse_date(&args.from)?,
            to: parse_date(&args.to)?,
        },
    })
}

fn settings_from(tuning: &TuningArgs) -> SyncSettings {
    let mut settings = SyncSettings::default();
    if let Some(page_size) = tuning.page_size {
        settings = settings.with_page_size(page_size);
    }
    if let Some(ceiling_mb) = tuning.memory_limit_mb {
        settings = settings.with_memory_ceiling_mb(ceiling_mb);
    }
    if let Some(concurrency) = tuning.write_concurrency {
        settings = settings.with_write_concurrency(concurrency);
    }
    settings
}
