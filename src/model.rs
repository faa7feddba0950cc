use crate::error::EtlError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry exactly as scraped: price and availability keep the
/// source page's original text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawBook {
    pub title: String,
    pub price: String,
    pub availability: String,
}

/// Insert shape for one `staging_books` row. `processed` and `created_at`
/// are owned by the schema defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingBook {
    pub title: String,
    pub price_gbp: f64,
    pub availability: String,
    pub is_in_stock: bool,
    pub scraped_date: NaiveDate,
    pub batch_id: String,
}

/// A normalized, priced record. Only in-stock books make it into the
/// processed set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedBook {
    pub title: String,
    pub price_gbp: f64,
    pub price_usd: f64,
    pub price_eur: f64,
    pub in_stock: bool,
    pub availability: String,
    pub processed_at: DateTime<Utc>,
}

/// Aggregates over one run's records. Averages are 0 when nothing is in
/// stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_books_raw: usize,
    pub books_in_stock: usize,
    pub books_out_of_stock: usize,
    pub total_inventory_value_gbp: f64,
    pub total_inventory_value_usd: f64,
    pub average_price_gbp: f64,
    pub average_price_usd: f64,
    pub processed_at: DateTime<Utc>,
}

/// Result row of `process_cdc_batch()`, reported verbatim: field order
/// matches the procedure's column order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CdcSummary {
    pub new_books: i64,
    pub removed_books: i64,
    pub price_changes: i64,
    pub stock_changes: i64,
    pub total_processed: i64,
}

/// Batch ID in the form `<prefix>_<YYYY-MM-DD>_<HHMMSS>` (UTC), unique per
/// collector invocation.
pub fn generate_batch_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Utc::now().format("%Y-%m-%d_%H%M%S"))
}

/// Collector success report. Failures propagate to the caller so the
/// scheduler marks the run as failed.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorReport {
    pub status: &'static str,
    pub run_date: NaiveDate,
    pub batch_id: String,
    pub records_scraped: usize,
    pub records_inserted: u64,
    pub storage_key: String,
    pub execution_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StorageKeys {
    pub processed: String,
    pub summary: String,
}

/// Reconciler report: one shape for both outcomes. The reconciler never
/// propagates failures; an error run is the same struct with `status:
/// "error"` and the error descriptor filled in.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcilerReport {
    pub status: &'static str,
    pub run_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub processed_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<DailySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdc_summary: Option<CdcSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_keys: Option<StorageKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    pub execution_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl ReconcilerReport {
    pub fn failure(run_date: NaiveDate, err: &EtlError, execution_time_seconds: f64) -> Self {
        Self {
            status: "error",
            run_date,
            batch_id: None,
            processed_records: 0,
            summary: None,
            cdc_summary: None,
            storage_keys: None,
            error_message: Some(err.to_string()),
            error_type: Some(err.kind()),
            execution_time_seconds,
            timestamp: Utc::now(),
        }
    }
}

/// Error payload printed by the collector before it re-raises.
pub fn failure_payload(
    run_date: NaiveDate,
    err: &EtlError,
    execution_time_seconds: f64,
) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "run_date": run_date,
        "error_message": err.to_string(),
        "error_type": err.kind(),
        "execution_time_seconds": execution_time_seconds,
        "timestamp": Utc::now(),
    })
}
