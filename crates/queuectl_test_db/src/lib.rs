#![doc = include_str!("../README.md")]

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sql_query;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::deadpool;
use diesel_async::{AsyncConnection, AsyncPgConnection};
use diesel_migrations::{FileBasedMigrations, MigrationHarness};
use queuectl_env_vars::required_var;
use rand::Rng;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum size of the async pool handed to worker runners in tests. Large
/// enough for a handful of workers plus the claims made by the test itself.
const ASYNC_POOL_SIZE: usize = 8;

struct TemplateDatabase {
    base_url: Url,
    pool: Pool<ConnectionManager<PgConnection>>,
    template_name: String,
    prefix: String,
}

impl TemplateDatabase {
    #[instrument]
    pub fn instance() -> &'static Self {
        static INSTANCE: LazyLock<TemplateDatabase> = LazyLock::new(TemplateDatabase::new);
        &INSTANCE
    }

    #[instrument]
    fn new() -> Self {
        let base_url = required_var("TEST_DATABASE_URL").unwrap();
        let base_url = Url::parse(&base_url).expect("failed to parse TEST_DATABASE_URL");

        let prefix = base_url.path().strip_prefix('/');
        let prefix = prefix.expect("failed to parse database name").to_string();

        let pool = Pool::builder()
            .connection_timeout(CONNECTION_TIMEOUT)
            .max_size(10)
            .min_idle(Some(0))
            .build_unchecked(ConnectionManager::new(base_url.as_ref()));

        let mut conn = pool.get().expect("failed to connect to the database");

        let template_name = format!("{prefix}_template");
        create_template_database(&template_name, &mut conn)
            .expect("failed to create template database");

        let mut template_url = base_url.clone();
        template_url.set_path(&format!("/{template_name}"));

        let mut template_conn =
            connect(template_url.as_ref()).expect("failed to connect to the template database");
        run_migrations(&mut template_conn)
            .expect("failed to run migrations on the template database");

        TemplateDatabase {
            base_url,
            pool,
            template_name,
            prefix,
        }
    }

    #[instrument(skip(self))]
    fn get_connection(&self) -> PooledConnection<ConnectionManager<PgConnection>> {
        self.pool.get().expect("Failed to get database connection")
    }
}

pub struct TestDatabase {
    name: String,
    url: Url,
}

impl TestDatabase {
    /// Creates a new Postgres database based on a template with the `jobs`
    /// and `settings` tables already migrated. Once the `TestDatabase`
    /// instance is dropped, the database is automatically deleted.
    #[allow(clippy::new_without_default)]
    #[instrument]
    pub fn new() -> TestDatabase {
        let template = TemplateDatabase::instance();

        let name = format!("{}_{}", template.prefix, generate_name().to_lowercase());

        let mut conn = template.get_connection();
        create_database_from_template(&name, &template.template_name, &mut conn)
            .expect("Failed to create test database");

        let mut url = template.base_url.clone();
        url.set_path(&format!("/{name}"));

        TestDatabase { name, url }
    }

    pub fn url(&self) -> &str {
        self.url.as_ref()
    }

    #[instrument(skip(self))]
    pub async fn async_connect(&self) -> AsyncPgConnection {
        AsyncPgConnection::establish(self.url())
            .await
            .expect("Failed to connect to database")
    }

    /// Builds a `deadpool` connection pool for this database, as used by the
    /// worker runner.
    pub fn async_pool(&self) -> deadpool::Pool<AsyncPgConnection> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(self.url());
        deadpool::Pool::builder(manager)
            .max_size(ASYNC_POOL_SIZE)
            .build()
            .expect("Failed to build async connection pool")
    }
}

impl Drop for TestDatabase {
    #[instrument(skip(self))]
    fn drop(&mut self) {
        // `WITH (FORCE)` disconnects any connections the test left open.
        let mut conn = TemplateDatabase::instance().get_connection();
        drop_database(&self.name, &mut conn).expect("failed to drop test database");
    }
}

#[instrument]
fn connect(database_url: &str) -> ConnectionResult<PgConnection> {
    debug!("Connecting to database…");
    PgConnection::establish(database_url)
}

#[instrument(skip(conn))]
fn create_template_database(name: &str, conn: &mut PgConnection) -> QueryResult<()> {
    table! {
        pg_database (datname) {
            datname -> Text,
        }
    }

    debug!("Checking if template database already exists…");
    let count: i64 = pg_database::table
        .count()
        .filter(pg_database::datname.eq(name))
        .get_result(conn)?;

    if count == 0 {
        debug!("Creating template database…");
        sql_query(format!("CREATE DATABASE {name}")).execute(conn)?;
    } else {
        debug!(%count, "Skipping template database creation");
    }

    Ok(())
}

#[instrument(skip(conn))]
fn create_database_from_template(
    name: &str,
    template_name: &str,
    conn: &mut PgConnection,
) -> QueryResult<()> {
    debug!("Creating new test database from template…");
    sql_query(format!("CREATE DATABASE {name} TEMPLATE {template_name}")).execute(conn)?;
    Ok(())
}

#[instrument(skip(conn))]
fn drop_database(name: &str, conn: &mut PgConnection) -> QueryResult<()> {
    debug!("Dropping database…");
    sql_query(format!("DROP DATABASE {name} WITH (FORCE)")).execute(conn)?;
    Ok(())
}

#[instrument(skip(conn))]
fn run_migrations(conn: &mut PgConnection) -> diesel::migration::Result<()> {
    debug!("Running pending database migrations…");
    let migrations = FileBasedMigrations::find_migrations_directory()?;
    conn.run_pending_migrations(migrations)?;
    Ok(())
}

fn generate_name() -> String {
    let mut rng = rand::rng();
    std::iter::repeat(())
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .take(16)
        .collect()
}
