//! Configuration for connecting to the database
//!
//! - `DATABASE_URL`: The URL of the postgres database to use.
//! - `DB_POOL_SIZE`: The number of connections in the worker pool.
//! - `DB_TIMEOUT`: Seconds to wait for a new connection to be established.

use queuectl_env_vars::{required_var, var_parsed, var_secs};
use secrecy::SecretString;
use std::time::Duration;

#[derive(Debug)]
pub struct DatabaseConfig {
    pub url: SecretString,
    /// Maximum number of connections held by the worker pool. Workers only
    /// hold a connection while claiming a job or recording its outcome, so
    /// this may be smaller than the number of workers.
    pub pool_size: usize,
    /// Time to wait for a connection to be established before returning an
    /// error.
    pub connection_timeout: Duration,
}

impl DatabaseConfig {
    const DEFAULT_POOL_SIZE: usize = 5;
    const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn from_environment() -> anyhow::Result<Self> {
        let url = required_var("DATABASE_URL")?.into();

        let pool_size = var_parsed("DB_POOL_SIZE")?.unwrap_or(Self::DEFAULT_POOL_SIZE);
        anyhow::ensure!(pool_size > 0, "DB_POOL_SIZE must be at least 1");

        let connection_timeout =
            var_secs("DB_TIMEOUT")?.unwrap_or(Self::DEFAULT_CONNECTION_TIMEOUT);

        Ok(Self {
            url,
            pool_size,
            connection_timeout,
        })
    }
}
