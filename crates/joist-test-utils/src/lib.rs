//! Postgres harness for joist integration tests.
//!
//! One PostgreSQL server is shared across the whole test binary; every test
//! that needs storage creates a throwaway database on it, runs the
//! migrations, and drops the database when it is done.
//!
//! The server comes from one of two places:
//! - `JOIST_TEST_PG_URL` points at an already-running server (e.g. started
//!   once by a nextest setup script), in which case no container is spawned;
//! - otherwise a testcontainers Postgres is started lazily and held for the
//!   lifetime of the binary.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use joist_db::pool;

struct SharedServer {
    base_url: String,
    // Dropping the handle kills the container, so it lives here.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED: OnceCell<SharedServer> = OnceCell::const_new();

async fn start_shared_server() -> SharedServer {
    if let Ok(url) = std::env::var("JOIST_TEST_PG_URL") {
        return SharedServer {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedServer {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Base URL of the shared server, without a database name. Starts the
/// container on first use unless `JOIST_TEST_PG_URL` is set.
pub async fn pg_url() -> &'static str {
    &SHARED.get_or_init(start_shared_server).await.base_url
}

async fn maintenance_conn(base_url: &str) -> PgConnection {
    PgConnection::connect(&format!("{base_url}/postgres"))
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a fresh uniquely named database with migrations applied.
///
/// Returns the pool plus the database name; pass the name to
/// [`drop_test_db`] at the end of the test.
pub async fn create_test_db() -> (PgPool, String) {
    let base_url = pg_url().await;
    let db_name = format!("joist_test_{}", Uuid::new_v4().simple());

    let mut maint = maintenance_conn(base_url).await;
    maint
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    let _ = maint.close().await;

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{base_url}/{db_name}"))
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&db_pool)
        .await
        .expect("migrations should succeed");

    (db_pool, db_name)
}

/// Drop a database created by [`create_test_db`]. Any lingering connections
/// are terminated first; a database that is already gone is not an error.
pub async fn drop_test_db(db_name: &str) {
    let base_url = pg_url().await;
    let mut maint = maintenance_conn(base_url).await;

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint.execute(terminate.as_str()).await;
    let _ = maint
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    let _ = maint.close().await;
}
