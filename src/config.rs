mod database;
mod workers;

pub use self::database::DatabaseConfig;
pub use self::workers::WorkerConfig;

pub struct Config {
    pub db: DatabaseConfig,
    pub workers: WorkerConfig,
}

impl Config {
    /// Returns a default value for the application's config
    ///
    /// Sets the following default values:
    ///
    /// - Database pool size: 5
    /// - Connection timeout: 30 seconds
    /// - Worker poll interval: 1 second
    /// - Worker shutdown grace period: 10 seconds
    ///
    /// Pulls values from the following environment variables:
    ///
    /// - `DATABASE_URL`: The URL of the postgres database to use.
    /// - `DB_POOL_SIZE`: The maximum number of pooled database connections.
    /// - `DB_TIMEOUT`: Seconds to wait when establishing a connection.
    /// - `WORKER_POLL_INTERVAL_MS`: How long an idle worker sleeps before
    ///   polling again.
    /// - `WORKER_SHUTDOWN_GRACE_SECONDS`: How long `worker start` waits for
    ///   running jobs after a shutdown signal.
    pub fn from_environment() -> anyhow::Result<Self> {
        Ok(Config {
            db: DatabaseConfig::from_environment()?,
            workers: WorkerConfig::from_environment()?,
        })
    }
}
