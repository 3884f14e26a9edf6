use queuectl::config::Config;
use queuectl::db;
use queuectl_worker::Runner;
use tokio::signal;

#[derive(clap::Parser, Debug)]
#[command(name = "worker", rename_all = "snake_case")]
pub enum Command {
    /// Start workers and run jobs until interrupted with Ctrl+C or SIGTERM.
    Start {
        /// Number of workers running jobs concurrently.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        count: u16,
    },
}

pub async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Start { count } => start(usize::from(count)).await,
    }
}

async fn start(count: usize) -> anyhow::Result<()> {
    let config = Config::from_environment()?;
    let connection_pool = db::connection_pool(&config.db).await?;

    info!(worker.count = count, "Booting runner");
    let handle = Runner::new(connection_pool)
        .num_workers(count)
        .poll_interval(config.workers.poll_interval)
        .start();

    println!("Started {count} worker(s). Press Ctrl+C to stop.");

    shutdown_signal().await;

    println!("Shutting down, waiting for running jobs to finish…");
    let aborted = handle.shutdown(config.workers.grace_period).await;
    if aborted > 0 {
        warn!(
            worker.aborted = aborted,
            "Terminated workers that did not stop within {:?}, their jobs remain `processing`",
            config.workers.grace_period
        );
    }

    info!("All workers stopped");
    Ok(())
}

/// Resolves once the process receives Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
