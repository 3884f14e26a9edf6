use anyhow::Context;
use queuectl::db;
use queuectl_worker::{EnqueueRequest, NewJob, settings, storage};

#[derive(clap::Parser, Debug)]
#[command(name = "enqueue", about = "Add a new job to the queue.")]
pub struct Opts {
    /// The job as JSON, e.g. '{"id": "job1", "command": "sleep 2"}'. The
    /// optional `max_retries` field defaults to the `max_retries` setting.
    job: String,
}

pub async fn run(opts: Opts) -> anyhow::Result<()> {
    // Malformed payloads are rejected before connecting to the database.
    let request = EnqueueRequest::from_json(&opts.job)?;

    let mut conn = db::oneoff_connection().await?;

    let default_max_retries = match request.max_retries {
        Some(_) => queuectl_worker::DEFAULT_MAX_RETRIES,
        None => settings::default_max_retries(&mut conn)
            .await
            .context("Failed to read the `max_retries` setting")?,
    };

    let job = NewJob::try_from_request(request, default_max_retries)?;
    let job = storage::enqueue(&mut conn, &job).await?;

    info!(job.id = %job.id, job.max_retries = job.max_retries, "Job enqueued");
    println!("Job '{}' enqueued.", job.id);

    Ok(())
}
