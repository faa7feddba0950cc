//! Collector pipeline: connectivity check → scrape → raw persist → staging
//! insert. Each stage is a hard dependency on the prior; nothing retries.
use crate::db::Warehouse;
use crate::error::EtlError;
use crate::model::{generate_batch_id, CollectorReport, RawBook, StagingBook};
use crate::scrape::CatalogSource;
use crate::storage::{self, ObjectStore};
use crate::transform;
use chrono::{NaiveDate, Utc};
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const BATCH_PREFIX: &str = "collect";

/// Run one collection for `run_date`. Errors propagate to the caller so the
/// scheduler marks the run as failed.
#[instrument(skip_all, fields(%run_date))]
pub async fn run(
    catalog: &dyn CatalogSource,
    store: &dyn ObjectStore,
    warehouse: &dyn Warehouse,
    run_date: NaiveDate,
) -> Result<CollectorReport, EtlError> {
    let start = Instant::now();
    let run_id = Uuid::new_v4();
    let batch_id = generate_batch_id(BATCH_PREFIX);
    info!(%run_id, batch_id, "collector starting");

    if !warehouse.test_connectivity().await {
        return Err(EtlError::Connectivity(
            "database connectivity test failed".into(),
        ));
    }

    let books = catalog.fetch().await?;
    if books.is_empty() {
        return Err(EtlError::EmptyResult);
    }
    info!(count = books.len(), "scraped catalog entries");

    let storage_key = storage::raw_books_key(run_date);
    let body = serde_json::to_value(&books)
        .map_err(|err| EtlError::Storage(format!("serializing raw records: {err}")))?;
    store.put_json(&storage_key, &body).await?;

    let rows = build_staging_rows(&books, run_date, &batch_id);
    let records_inserted = warehouse.insert_staging_books(&rows).await?;

    let report = CollectorReport {
        status: "success",
        run_date,
        batch_id,
        records_scraped: books.len(),
        records_inserted,
        storage_key,
        execution_time_seconds: transform::round2(start.elapsed().as_secs_f64()),
        timestamp: Utc::now(),
    };
    info!(
        records_scraped = report.records_scraped,
        records_inserted = report.records_inserted,
        "collector finished"
    );
    Ok(report)
}

/// Build staging rows for one batch. A record whose price fails to parse is
/// logged and skipped; the batch continues.
pub fn build_staging_rows(
    books: &[RawBook],
    run_date: NaiveDate,
    batch_id: &str,
) -> Vec<StagingBook> {
    books
        .iter()
        .filter_map(|book| match transform::parse_price(&book.price) {
            Ok(price_gbp) => Some(StagingBook {
                title: book.title.clone(),
                price_gbp,
                availability: book.availability.clone(),
                is_in_stock: transform::is_in_stock(&book.availability),
                scraped_date: run_date,
                batch_id: batch_id.to_string(),
            }),
            Err(err) => {
                warn!(title = %book.title, price = %book.price, %err, "skipping staging row: unparseable price");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_rows_skip_unparseable_prices() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let books = vec![
            RawBook {
                title: "A".into(),
                price: "£10.00".into(),
                availability: "In stock (3 available)".into(),
            },
            RawBook {
                title: "B".into(),
                price: "n/a".into(),
                availability: "In stock (1 available)".into(),
            },
            RawBook {
                title: "C".into(),
                price: "Â£5.00".into(),
                availability: "Out of stock".into(),
            },
        ];

        let rows = build_staging_rows(&books, date, "collect_2026-08-06_080512");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "A");
        assert_eq!(rows[0].price_gbp, 10.0);
        assert!(rows[0].is_in_stock);
        assert_eq!(rows[1].title, "C");
        assert_eq!(rows[1].price_gbp, 5.0);
        assert!(!rows[1].is_in_stock);
        assert!(rows.iter().all(|r| r.batch_id == "collect_2026-08-06_080512"));
        assert!(rows.iter().all(|r| r.scraped_date == date));
    }
}
