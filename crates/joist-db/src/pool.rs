use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Embedded migrations from `crates/joist-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a connection pool against the configured database.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Apply any pending embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!("migrations applied");
    Ok(())
}

/// Create the target database if it does not exist yet.
///
/// Goes through the `postgres` maintenance database, since `CREATE DATABASE`
/// cannot run against the database being created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = config
        .database_name()
        .context("could not determine database name from URL")?;

    let maintenance_url = config.maintenance_url();
    let mut conn = PgConnection::connect(&maintenance_url)
        .await
        .with_context(|| {
            format!("failed to connect to maintenance database at {maintenance_url}")
        })?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&mut conn)
            .await
            .context("failed to query pg_database")?;

    if exists {
        info!(db = db_name, "database already exists");
    } else {
        // CREATE DATABASE takes no bind parameters, so the name is validated
        // before being spliced into the statement.
        if !is_safe_identifier(db_name) {
            bail!("database name {db_name:?} contains invalid characters");
        }
        conn.execute(format!("CREATE DATABASE {db_name}").as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "database created");
    }

    conn.close().await?;
    Ok(())
}

fn is_safe_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Row counts for every table in the `public` schema. Feeds the
/// `joist db-init` report.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' ORDER BY tablename",
    )
    .fetch_all(pool)
    .await
    .context("failed to list tables")?;

    let mut counts = Vec::with_capacity(tables.len());
    for table in tables {
        // Names come straight out of pg_tables, so splicing is safe.
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table, count));
    }
    Ok(counts)
}
