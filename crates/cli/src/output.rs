use crate::error::CliError;
use sync_engine::orchestrator::RunSummary;
use sync_queue::job::JobRecord;

pub fn print_summary(summary: &RunSummary, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json = serde_json::to_string_pretty(summary).map_err(CliError::JsonSerialize)?;
        println!("{json}");
        return Ok(());
    }

    println!("Sync run finished:");
    println!("-----------------------------");
    println!("{:<16} {}", "Status", summary.status);
    println!("{:<16} {}", "Processed", summary.processed);
    println!("{:<16} {}", "Inserted", summary.stats.inserted_records);
    println!("{:<16} {}", "Skipped", summary.stats.skipped_records);
    println!("{:<16} {}", "Errored", summary.stats.error_records);
    println!("{:<16} {:.1}s", "Elapsed", summary.elapsed_seconds);
    Ok(())
}

pub fn print_job(job: &JobRecord, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json = serde_json::to_string_pretty(job).map_err(CliError::JsonSerialize)?;
        println!("{json}");
        return Ok(());
    }

    println!("Job {}:", job.id);
    println!("-----------------------------");
    println!("{:<16} {}", "Name", job.name);
    println!("{:<16} {}", "State", job.state);
    println!("{:<16} {}", "Dataset", job.payload.dataset_id);
    println!("{:<16} {}", "Kind", job.payload.kind);
    println!("{:<16} {}/{}", "Attempts", job.attempts, job.max_attempts);
    println!("{:<16} {}", "Enqueued", job.enqueued_at.to_rfc3339());
    if let Some(progress) = &job.progress {
        let percent = progress
            .progress
            .map(|p| format!("{p:.1}%"))
            .unwrap_or_else(|| "n/a".to_string());
        println!("{:<16} {}", "Progress", percent);
        println!("{:<16} {}", "Processed", progress.processed_count);
        println!("{:<16} {} MB", "Memory", progress.memory_usage_mb);
    }
    if let Some(until) = job.delay_until {
        println!("{:<16} {}", "Redelivery at", until.to_rfc3339());
    }
    if let Some(error) = &job.error {
        println!("{:<16} {}", "Last error", error);
    }
    Ok(())
}

pub fn print_jobs(jobs: &[JobRecord], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let json = serde_json::to_string_pretty(&jobs).map_err(CliError::JsonSerialize)?;
        println!("{json}");
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No jobs in the queue.");
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<10} {:<9} {:<9} {}",
        "ID", "NAME", "STATE", "ATTEMPTS", "PROGRESS", "ENQUEUED"
    );
    for job in jobs {
        let percent = job
            .progress
            .as_ref()
            .and_then(|p| p.progress)
            .map(|p| format!("{p:.0}%"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<20} {:<10} {:<9} {:<9} {}",
            job.id,
            job.name,
            job.state,
            format!("{}/{}", job.attempts, job.max_attempts),
            percent,
            job.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}
