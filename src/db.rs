use crate::config::DatabaseConfig;
use anyhow::{Context, anyhow};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use secrecy::ExposeSecret;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Establishes a single connection using the `DATABASE_URL` environment
/// variable.
pub async fn oneoff_connection() -> anyhow::Result<AsyncPgConnection> {
    let config = DatabaseConfig::from_environment()?;
    oneoff_connection_with_config(&config).await
}

#[instrument(skip_all)]
pub async fn oneoff_connection_with_config(
    config: &DatabaseConfig,
) -> anyhow::Result<AsyncPgConnection> {
    debug!("Connecting to database…");

    let url = config.url.expose_secret();
    timeout(config.connection_timeout, AsyncPgConnection::establish(url))
        .await
        .map_err(|_| {
            anyhow!(
                "Timed out after {:?} while connecting to the database",
                config.connection_timeout
            )
        })?
        .context("Failed to connect to the database")
}

/// Builds the connection pool shared by all workers of one `worker start`
/// invocation and checks that a first connection can be established.
#[instrument(skip_all, fields(db.pool_size = config.pool_size))]
pub async fn connection_pool(config: &DatabaseConfig) -> anyhow::Result<Pool<AsyncPgConnection>> {
    let url = config.url.expose_secret();
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);

    let pool = Pool::builder(manager)
        .max_size(config.pool_size)
        .build()
        .context("Failed to build the database connection pool")?;

    debug!("Checking database connectivity…");
    timeout(config.connection_timeout, pool.get())
        .await
        .map_err(|_| {
            anyhow!(
                "Timed out after {:?} while connecting to the database",
                config.connection_timeout
            )
        })?
        .context("Failed to connect to the database")?;

    Ok(pool)
}
