use anyhow::Result;
use books_etl::db::{self, Database, Warehouse};
use books_etl::model;
use books_etl::scrape::HttpCatalogSource;
use books_etl::secrets::{CachedSecrets, FileSecretStore, SecretStore};
use books_etl::storage::FsObjectStore;
use books_etl::{collector, config, reconciler};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scrape the catalog, persist raw records and load the staging table
    Collect {
        /// Run date override (YYYY-MM-DD); defaults to today, UTC
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Transform raw records, persist them and trigger CDC batch processing
    Reconcile {
        /// Run date override (YYYY-MM-DD); defaults to today, UTC
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Staging batch to process, instead of querying for the most
        /// recent unprocessed one
        #[arg(long)]
        batch_id: Option<String>,
    },
    /// Apply database migrations
    Migrate,
    /// Probe database connectivity and print pool statistics
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let secrets: Arc<dyn SecretStore> = Arc::new(CachedSecrets::new(FileSecretStore::new(
        &cfg.database.secrets_dir,
    )));
    let database = Database::new(cfg.database.clone(), secrets);
    let store = FsObjectStore::new(&cfg.storage.root, &cfg.storage.bucket);

    match args.command {
        Command::Collect { date } => {
            let run_date = date.unwrap_or_else(|| Utc::now().date_naive());
            let catalog = HttpCatalogSource::new(&cfg.catalog.base_url);
            let start = Instant::now();
            match collector::run(&catalog, &store, &database, run_date).await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(err) => {
                    let payload =
                        model::failure_payload(run_date, &err, start.elapsed().as_secs_f64());
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                    database.close().await;
                    // Non-zero exit marks the scheduled run as failed.
                    return Err(err.into());
                }
            }
        }
        Command::Reconcile { date, batch_id } => {
            let run_date = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = reconciler::run(&store, &database, run_date, batch_id).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Migrate => {
            let pool = database.pool().await?;
            db::run_migrations(pool).await?;
            info!("migrations applied");
        }
        Command::Check => {
            let ok = database.test_connectivity().await;
            println!("{}", serde_json::to_string_pretty(&database.stats())?);
            if !ok {
                database.close().await;
                anyhow::bail!("database connectivity test failed");
            }
            println!("database connectivity: ok");
        }
    }

    database.close().await;
    Ok(())
}
