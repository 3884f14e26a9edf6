use crate::list::print_jobs;
use queuectl::db;
use queuectl_worker::{JobState, storage};

#[derive(clap::Parser, Debug)]
#[command(name = "dlq", rename_all = "snake_case")]
pub enum Command {
    /// List jobs that exhausted their attempts.
    List {
        /// Print the jobs as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Move a dead job back to `pending` with its attempts reset.
    Retry {
        /// The id of the dead job.
        id: String,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    let mut conn = db::oneoff_connection().await?;

    match command {
        Command::List { json } => {
            let jobs = storage::query(&mut conn, Some(JobState::Dead)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("The dead letter queue is empty.");
            } else {
                print_jobs(&jobs);
            }
        }
        Command::Retry { id } => {
            let job = storage::requeue(&mut conn, &id).await?;
            info!(job.id = %job.id, "Job moved out of the dead letter queue");
            println!("Job '{}' moved back to the queue.", job.id);
        }
    }

    Ok(())
}
