#[macro_use]
extern crate tracing;

use tracing::Instrument;

mod dlq;
mod enqueue;
mod list;
mod migrate;
mod settings;
mod status;
mod worker;

#[derive(clap::Parser, Debug)]
#[command(
    name = "queuectl",
    about = "A durable background job queue for shell commands.",
    version
)]
enum Command {
    Enqueue(enqueue::Opts),
    /// Manage worker processes
    #[clap(subcommand)]
    Worker(worker::Command),
    Status(status::Opts),
    List(list::Opts),
    /// Inspect and retry jobs in the dead letter queue
    #[clap(subcommand)]
    Dlq(dlq::Command),
    /// Manage persisted queue settings
    #[clap(subcommand)]
    Config(settings::Command),
    Migrate(migrate::Opts),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    queuectl::util::tracing::init();

    use clap::Parser;

    let span = info_span!("queuectl.command", command = tracing::field::Empty);
    let command = Command::parse();
    span.record("command", tracing::field::debug(&command));

    async move {
        match command {
            Command::Enqueue(opts) => enqueue::run(opts).await,
            Command::Worker(command) => worker::run(command).await,
            Command::Status(opts) => status::run(opts).await,
            Command::List(opts) => list::run(opts).await,
            Command::Dlq(command) => dlq::run(command).await,
            Command::Config(command) => settings::run(command).await,
            Command::Migrate(opts) => migrate::run(opts).await,
        }
    }
    .instrument(span)
    .await
}

#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Command::command().debug_assert();
}
