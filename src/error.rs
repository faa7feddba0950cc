//! Error taxonomy shared by both pipelines.
use chrono::NaiveDate;
use thiserror::Error;

/// All the ways a run can fail. Each variant carries the original message;
/// [`EtlError::kind`] supplies the stable tag reported as `error_type`.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Missing required settings or credential fields. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Database unreachable or pool exhausted within the fixed timeouts.
    #[error("database connectivity error: {0}")]
    Connectivity(String),
    /// Network/transport failure while fetching the catalog page.
    #[error("scrape failed: {0}")]
    Scrape(String),
    /// Zero records extracted: likely upstream structural change, for human
    /// investigation rather than retry.
    #[error("no catalog entries extracted; page structure likely changed")]
    EmptyResult,
    /// The collector's raw object for this date is absent.
    #[error("raw object not found: {0}")]
    MissingUpstream(String),
    /// Staging and reconciliation have desynchronized for this date.
    #[error("no unprocessed staging batch for date {0}")]
    BatchNotFound(NaiveDate),
    /// The CDC procedure returned no result row.
    #[error("CDC procedure returned no result for batch {0}")]
    Reconciliation(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EtlError {
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Configuration(_) => "ConfigurationError",
            EtlError::Connectivity(_) => "ConnectivityError",
            EtlError::Scrape(_) => "ScrapeError",
            EtlError::EmptyResult => "EmptyResultError",
            EtlError::MissingUpstream(_) => "MissingUpstreamError",
            EtlError::BatchNotFound(_) => "BatchNotFoundError",
            EtlError::Reconciliation(_) => "ReconciliationError",
            EtlError::Storage(_) => "StorageError",
            EtlError::Database(_) => "DatabaseError",
        }
    }
}
