use anyhow::{Context, anyhow};
use diesel_async::AsyncPgConnection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_migrations::{EmbeddedMigrations, HarnessWithOutput, MigrationHarness, embed_migrations};
use queuectl::db;
use queuectl::tasks::spawn_blocking;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[derive(clap::Parser, Debug, Copy, Clone)]
#[command(
    name = "migrate",
    about = "Create or upgrade the `jobs` and `settings` tables."
)]
pub struct Opts;

pub async fn run(_opts: Opts) -> anyhow::Result<()> {
    let conn = db::oneoff_connection()
        .await
        .context("Failed to connect to the database")?;

    let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::from(conn);

    spawn_blocking(move || {
        info!("Migrating the database");
        let mut stdout = std::io::stdout();
        let mut harness = HarnessWithOutput::new(&mut conn, &mut stdout);
        harness
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("Failed to run migrations: {err}"))?;

        Ok(())
    })
    .await
}
