use clap::{Args, Subcommand};

/// Dataset selection and connection arguments shared by `run` and
/// `enqueue`.
#[derive(Args, Clone)]
pub struct SyncArgs {
    #[arg(long, help = "Dataset ID to sync")]
    pub dataset_id: i64,

    #[arg(long, help = "Dataset kind: 'forecast' or 'actuals'")]
    pub kind: String,

    #[arg(long, help = "Range start, YYYY-MM-DD (inclusive)")]
    pub from: String,

    #[arg(long, help = "Range end, YYYY-MM-DD (inclusive)")]
    pub to: String,

    #[arg(long, help = "Warehouse connection string (PostgreSQL)")]
    pub warehouse_url: String,

    #[arg(long, help = "Target store connection string (MySQL)")]
    pub store_url: String,
}

/// Pipeline tunables; defaults match the profiled configuration.
#[derive(Args, Clone)]
pub struct TuningArgs {
    #[arg(long, help = "Rows per warehouse page")]
    pub page_size: Option<usize>,

    #[arg(long, help = "Memory ceiling in megabytes")]
    pub memory_limit_mb: Option<u64>,

    #[arg(long, help = "Concurrent batch writes")]
    pub write_concurrency: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync in the foreground, without the queue
    Run {
        #[command(flatten)]
        sync: SyncArgs,

        #[command(flatten)]
        tuning: TuningArgs,

        #[arg(long, help = "Print the run summary as JSON")]
        json: bool,
    },
    /// Add a sync job to the durable queue
    Enqueue {
        #[command(flatten)]
        sync: SyncArgs,

        #[arg(long, default_value_t = 0, help = "Priority; higher runs first")]
        priority: u8,
    },
    /// Run the queue worker until interrupted
    Worker {
        #[command(flatten)]
        tuning: TuningArgs,

        #[arg(long, default_value_t = 500, help = "Queue poll interval in milliseconds")]
        poll_ms: u64,
    },
    /// Show one job
    Status {
        #[arg(long, help = "Job ID")]
        id: String,

        #[arg(long, help = "Print as JSON instead of a table")]
        json: bool,
    },
    /// List known jobs
    Jobs {
        #[arg(long, help = "Only show jobs in this state")]
        state: Option<String>,

        #[arg(long, help = "Print as JSON instead of a table")]
        json: bool,
    },
    /// Cancel a job; a running job stops at its next chunk boundary
    Cancel {
        #[arg(long, help = "Job ID")]
        id: String,
    },
    /// Requeue a failed job from scratch
    Retry {
        #[arg(long, help = "Job ID")]
        id: String,
    },
    /// Move a delayed job to the front of the queue
    Promote {
        #[arg(long, help = "Job ID")]
        id: String,
    },
    /// Delete terminal jobs past the retention window
    Prune,
}
