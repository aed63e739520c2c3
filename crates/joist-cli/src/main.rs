mod config;
mod serve_cmd;
mod user_cmd;

use clap::{Parser, Subcommand};

use joist_core::lifecycle::EngineConfig;
use joist_db::pool;

use config::JoistConfig;

#[derive(Parser)]
#[command(name = "joist", about = "Project management engine for general contractors")]
struct Cli {
    /// Database URL (overrides JOIST_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a joist config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/joist")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the joist database (requires config file or env vars)
    DbInit,
    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Run the HTTP API server
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// When a dependent task starts relative to its parent's end:
        /// on-parent-end or day-after-parent-end
        #[arg(long, default_value = "on-parent-end")]
        start_convention: String,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a user (requests authenticate by email)
    Add {
        /// Display name
        name: String,
        /// Email address, unique per user
        email: String,
        /// Optional role label
        #[arg(long)]
        role: Option<String>,
    },
    /// List all users
    List,
}

/// `joist init`: write the config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}; pass --force to overwrite",
            path.display()
        );
    }

    config::save_config(&config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_owned(),
        },
    })?;

    println!("Wrote {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: `joist db-init` to create and migrate the database.");
    Ok(())
}

/// `joist db-init`: ensure the database exists and migrate it.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = JoistConfig::resolve(cli_db_url)?;

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    println!("Database ready:");
    for (table, count) in pool::table_counts(&db_pool).await? {
        println!("  {table}: {count} rows");
    }
    db_pool.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::User { command } => {
            let resolved = JoistConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                UserCommands::Add { name, email, role } => {
                    user_cmd::run_user_add(&db_pool, &name, &email, role.as_deref()).await
                }
                UserCommands::List => user_cmd::run_user_list(&db_pool).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Serve {
            bind,
            port,
            start_convention,
        } => {
            let convention = serve_cmd::parse_convention(&start_convention)?;
            let resolved = JoistConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = serve_cmd::run_serve(
                db_pool.clone(),
                &bind,
                port,
                EngineConfig {
                    start_convention: convention,
                },
            )
            .await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
