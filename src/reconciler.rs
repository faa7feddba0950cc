//! Reconciler pipeline: connectivity check → read raw → transform → persist
//! processed+summary → resolve batch id → invoke CDC.
//!
//! Unlike the collector, a failed run is reported as an error-status payload
//! rather than propagated: the orchestration schedule must not abort.
use crate::db::Warehouse;
use crate::error::EtlError;
use crate::model::{
    CdcSummary, DailySummary, ProcessedBook, RawBook, ReconcilerReport, StorageKeys,
};
use crate::storage::{self, ObjectStore};
use crate::transform;
use chrono::{NaiveDate, Utc};
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

struct Outcome {
    batch_id: String,
    processed: Vec<ProcessedBook>,
    summary: DailySummary,
    cdc_summary: CdcSummary,
    storage_keys: StorageKeys,
}

/// Run one reconciliation for `run_date`. `batch_override` bypasses the
/// staging-table batch lookup; passing the id explicitly is the safe path
/// when a retry or overlapping collector run is possible.
#[instrument(skip_all, fields(%run_date))]
pub async fn run(
    store: &dyn ObjectStore,
    warehouse: &dyn Warehouse,
    run_date: NaiveDate,
    batch_override: Option<String>,
) -> ReconcilerReport {
    let start = Instant::now();
    let run_id = Uuid::new_v4();
    info!(%run_id, "reconciler starting");

    match execute(store, warehouse, run_date, batch_override).await {
        Ok(outcome) => {
            info!(
                batch_id = %outcome.batch_id,
                processed_records = outcome.processed.len(),
                "reconciler finished"
            );
            ReconcilerReport {
                status: "success",
                run_date,
                batch_id: Some(outcome.batch_id),
                processed_records: outcome.processed.len(),
                summary: Some(outcome.summary),
                cdc_summary: Some(outcome.cdc_summary),
                storage_keys: Some(outcome.storage_keys),
                error_message: None,
                error_type: None,
                execution_time_seconds: transform::round2(start.elapsed().as_secs_f64()),
                timestamp: Utc::now(),
            }
        }
        Err(err) => {
            error!(%err, kind = err.kind(), "reconciler run failed");
            ReconcilerReport::failure(
                run_date,
                &err,
                transform::round2(start.elapsed().as_secs_f64()),
            )
        }
    }
}

async fn execute(
    store: &dyn ObjectStore,
    warehouse: &dyn Warehouse,
    run_date: NaiveDate,
    batch_override: Option<String>,
) -> Result<Outcome, EtlError> {
    if !warehouse.test_connectivity().await {
        return Err(EtlError::Connectivity(
            "database connectivity test failed".into(),
        ));
    }

    let raw_key = storage::raw_books_key(run_date);
    let value = store
        .get_json(&raw_key)
        .await?
        .ok_or_else(|| EtlError::MissingUpstream(raw_key.clone()))?;
    let raw: Vec<RawBook> = serde_json::from_value(value)
        .map_err(|err| EtlError::Storage(format!("invalid raw object {raw_key}: {err}")))?;
    info!(count = raw.len(), "read raw records");

    let (processed, summary) = transform::transform(&raw, run_date, Utc::now());
    info!(
        processed = processed.len(),
        in_stock = summary.books_in_stock,
        out_of_stock = summary.books_out_of_stock,
        "transformation complete"
    );

    let storage_keys = StorageKeys {
        processed: storage::processed_books_key(run_date),
        summary: storage::summary_key(run_date),
    };
    let processed_body = serde_json::to_value(&processed)
        .map_err(|err| EtlError::Storage(format!("serializing processed records: {err}")))?;
    store.put_json(&storage_keys.processed, &processed_body).await?;
    let summary_body = serde_json::to_value(&summary)
        .map_err(|err| EtlError::Storage(format!("serializing summary: {err}")))?;
    store.put_json(&storage_keys.summary, &summary_body).await?;

    let batch_id = match batch_override {
        Some(batch_id) => {
            info!(batch_id, "using explicit batch id");
            batch_id
        }
        None => warehouse
            .latest_unprocessed_batch(run_date)
            .await?
            .ok_or(EtlError::BatchNotFound(run_date))?,
    };
    info!(batch_id, "resolved staging batch");

    let cdc_summary = warehouse.process_cdc_batch(&batch_id, run_date).await?;

    Ok(Outcome {
        batch_id,
        processed,
        summary,
        cdc_summary,
        storage_keys,
    })
}
