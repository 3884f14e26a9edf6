use queuectl::db;
use queuectl_worker::{JobState, storage};

#[derive(clap::Parser, Debug)]
#[command(name = "status", about = "Show the number of jobs in each state.")]
pub struct Opts {
    /// Print the counts as a JSON object.
    #[arg(long)]
    json: bool,
}

pub async fn run(opts: Opts) -> anyhow::Result<()> {
    let mut conn = db::oneoff_connection().await?;
    let counts = storage::counts_by_state(&mut conn).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("{:<12} {:>8}", "STATE", "JOBS");
    for state in JobState::VARIANTS {
        println!("{:<12} {:>8}", state, counts.get(state));
    }
    println!("{:<12} {:>8}", "total", counts.total());

    Ok(())
}
