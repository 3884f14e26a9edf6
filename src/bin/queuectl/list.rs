use queuectl::db;
use queuectl_worker::{Job, JobState, storage};

#[derive(clap::Parser, Debug)]
#[command(
    name = "list",
    about = "List jobs, most recently updated first."
)]
pub struct Opts {
    /// Only list jobs in this state (pending, processing, completed or dead).
    #[arg(long)]
    state: Option<JobState>,

    /// Print the jobs as a JSON array.
    #[arg(long)]
    json: bool,
}

pub async fn run(opts: Opts) -> anyhow::Result<()> {
    let mut conn = db::oneoff_connection().await?;
    let jobs = storage::query(&mut conn, opts.state).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else if jobs.is_empty() {
        match opts.state {
            Some(state) => println!("No jobs in state '{state}'."),
            None => println!("No jobs found."),
        }
    } else {
        print_jobs(&jobs);
    }

    Ok(())
}

/// Prints `jobs` as a plain text table. Shared with `dlq list`.
pub fn print_jobs(jobs: &[Job]) {
    println!(
        "{:<20} {:<10} {:>8} {:<25} {:<25} COMMAND",
        "ID", "STATE", "ATTEMPTS", "UPDATED", "RETRY AFTER"
    );

    for job in jobs {
        let attempts = format!("{}/{}", job.attempts, job.max_retries);
        let updated_at = job.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let retry_after = job
            .retry_after_time
            .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<20} {:<10} {:>8} {:<25} {:<25} {}",
            job.id, job.state, attempts, updated_at, retry_after, job.command
        );
    }
}
