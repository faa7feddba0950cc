//! Warehouse access: pooled, credentialed connections and the staging/CDC
//! operations behind the [`Warehouse`] trait.
use crate::config;
use crate::error::EtlError;
use crate::model::{CdcSummary, StagingBook};
use crate::secrets::{DbCredentials, SecretStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

/// Connection acquisition timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Server-side statement timeout, milliseconds.
pub const STATEMENT_TIMEOUT_MS: u32 = 30_000;

/// Warehouse operations used by the pipelines. Narrow on purpose: the CDC
/// algorithm lives in the database and is only ever invoked by name.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Trivial round-trip query; returns false instead of erroring.
    async fn test_connectivity(&self) -> bool;

    /// Multi-row insert of one batch into `staging_books`. Returns rows
    /// inserted.
    async fn insert_staging_books(&self, rows: &[StagingBook]) -> Result<u64, EtlError>;

    /// Most recent unprocessed batch id for the date, if any.
    async fn latest_unprocessed_batch(
        &self,
        run_date: NaiveDate,
    ) -> Result<Option<String>, EtlError>;

    /// Invoke `process_cdc_batch(batch_id, run_date)` and report its five
    /// counts verbatim.
    async fn process_cdc_batch(
        &self,
        batch_id: &str,
        run_date: NaiveDate,
    ) -> Result<CdcSummary, EtlError>;
}

/// Pooled connection provider. Construction is cheap and touches nothing;
/// the pool is built on first use, resolving credentials through the
/// injected secret store. The pool and the store's cache are the only state
/// shared across runs of a reused process.
pub struct Database {
    cfg: config::Database,
    secrets: Arc<dyn SecretStore>,
    pool: OnceCell<PgPool>,
}

/// Pool statistics snapshot, best-effort.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub min_size: u32,
    pub max_size: u32,
    pub size: u32,
    pub idle: usize,
    pub status: &'static str,
}

impl Database {
    pub fn new(cfg: config::Database, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            cfg,
            secrets,
            pool: OnceCell::new(),
        }
    }

    /// The shared pool, building it on first call.
    pub async fn pool(&self) -> Result<&PgPool, EtlError> {
        self.pool.get_or_try_init(|| self.init_pool()).await
    }

    async fn init_pool(&self) -> Result<PgPool, EtlError> {
        let secret = self.secrets.fetch(&self.cfg.secret_name).await?;
        let creds = DbCredentials::from_secret(&secret)?;

        info!(
            host = %creds.host,
            port = creds.port,
            dbname = %creds.dbname,
            min = self.cfg.pool_min_size,
            max = self.cfg.pool_max_size,
            "initializing connection pool"
        );

        let options = PgConnectOptions::new()
            .host(&creds.host)
            .port(creds.port)
            .database(&creds.dbname)
            .username(&creds.username)
            .password(&creds.password)
            .options([("statement_timeout", STATEMENT_TIMEOUT_MS.to_string())]);

        PgPoolOptions::new()
            .min_connections(self.cfg.pool_min_size)
            .max_connections(self.cfg.pool_max_size)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|err| EtlError::Connectivity(err.to_string()))
    }

    pub fn stats(&self) -> PoolStats {
        match self.pool.get() {
            Some(pool) => PoolStats {
                min_size: self.cfg.pool_min_size,
                max_size: self.cfg.pool_max_size,
                size: pool.size(),
                idle: pool.num_idle(),
                status: "initialized",
            },
            None => PoolStats {
                min_size: self.cfg.pool_min_size,
                max_size: self.cfg.pool_max_size,
                size: 0,
                idle: 0,
                status: "not_initialized",
            },
        }
    }

    /// Close all pooled connections. Normally the pool lives as long as the
    /// process; this exists for tests and orderly shutdown.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            info!("connection pool closed");
        }
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[async_trait]
impl Warehouse for Database {
    #[instrument(skip_all)]
    async fn test_connectivity(&self) -> bool {
        let pool = match self.pool().await {
            Ok(pool) => pool,
            Err(err) => {
                warn!(%err, "connectivity test failed");
                return false;
            }
        };
        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
            Ok(1) => true,
            Ok(other) => {
                warn!(other, "connectivity test returned unexpected value");
                false
            }
            Err(err) => {
                warn!(%err, "connectivity test failed");
                false
            }
        }
    }

    #[instrument(skip_all, fields(rows = rows.len()))]
    async fn insert_staging_books(&self, rows: &[StagingBook]) -> Result<u64, EtlError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;
        for row in rows {
            sqlx::query(
                "INSERT INTO staging_books \
                 (title, price_gbp, availability, is_in_stock, scraped_date, batch_id) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&row.title)
            .bind(row.price_gbp)
            .bind(&row.availability)
            .bind(row.is_in_stock)
            .bind(row.scraped_date)
            .bind(&row.batch_id)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }
        // Dropping the transaction on any error path above rolls it back.
        tx.commit().await?;
        info!(inserted, "staging rows committed");
        Ok(inserted)
    }

    #[instrument(skip_all, fields(%run_date))]
    async fn latest_unprocessed_batch(
        &self,
        run_date: NaiveDate,
    ) -> Result<Option<String>, EtlError> {
        let pool = self.pool().await?;
        let batch_id = sqlx::query_scalar::<_, String>(
            "SELECT batch_id FROM staging_books \
             WHERE scraped_date = $1 AND processed = FALSE \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(run_date)
        .fetch_optional(pool)
        .await?;
        Ok(batch_id)
    }

    #[instrument(skip_all, fields(batch_id, %run_date))]
    async fn process_cdc_batch(
        &self,
        batch_id: &str,
        run_date: NaiveDate,
    ) -> Result<CdcSummary, EtlError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        let row = sqlx::query("SELECT * FROM process_cdc_batch($1, $2)")
            .bind(batch_id)
            .bind(run_date)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(EtlError::Reconciliation(batch_id.to_string()));
        };

        let summary = CdcSummary {
            new_books: row.try_get(0)?,
            removed_books: row.try_get(1)?,
            price_changes: row.try_get(2)?,
            stock_changes: row.try_get(3)?,
            total_processed: row.try_get(4)?,
        };
        tx.commit().await?;

        info!(
            new_books = summary.new_books,
            removed_books = summary.removed_books,
            price_changes = summary.price_changes,
            stock_changes = summary.stock_changes,
            total_processed = summary.total_processed,
            "CDC batch processed"
        );
        Ok(summary)
    }
}
