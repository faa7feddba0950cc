use async_trait::async_trait;
use books_etl::collector;
use books_etl::db::Warehouse;
use books_etl::error::EtlError;
use books_etl::model::{CdcSummary, RawBook, StagingBook};
use books_etl::reconciler;
use books_etl::scrape::CatalogSource;
use books_etl::storage::{self, ObjectStore};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
}

fn raw(title: &str, price: &str, availability: &str) -> RawBook {
    RawBook {
        title: title.into(),
        price: price.into(),
        availability: availability.into(),
    }
}

#[derive(Clone, Default)]
struct MemoryStore {
    objects: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    async fn object(&self, key: &str) -> Option<Value> {
        self.objects.lock().await.get(key).cloned()
    }

    async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_json(&self, key: &str, body: &Value) -> Result<(), EtlError> {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), body.clone());
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<Value>, EtlError> {
        Ok(self.objects.lock().await.get(key).cloned())
    }
}

#[derive(Clone, Default)]
struct StubCatalog {
    books: Vec<RawBook>,
}

#[async_trait]
impl CatalogSource for StubCatalog {
    async fn fetch(&self) -> Result<Vec<RawBook>, EtlError> {
        Ok(self.books.clone())
    }
}

#[derive(Clone)]
struct FakeWarehouse {
    connectivity: bool,
    batch: Option<String>,
    cdc: Option<CdcSummary>,
    staged: Arc<Mutex<Vec<StagingBook>>>,
    cdc_calls: Arc<Mutex<Vec<(String, NaiveDate)>>>,
}

impl FakeWarehouse {
    fn new() -> Self {
        Self {
            connectivity: true,
            batch: None,
            cdc: None,
            staged: Arc::new(Mutex::new(Vec::new())),
            cdc_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn offline() -> Self {
        Self {
            connectivity: false,
            ..Self::new()
        }
    }

    fn with_batch(mut self, batch_id: &str) -> Self {
        self.batch = Some(batch_id.to_string());
        self
    }

    fn with_cdc(mut self, cdc: CdcSummary) -> Self {
        self.cdc = Some(cdc);
        self
    }

    async fn staged(&self) -> Vec<StagingBook> {
        self.staged.lock().await.clone()
    }

    async fn cdc_calls(&self) -> Vec<(String, NaiveDate)> {
        self.cdc_calls.lock().await.clone()
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn test_connectivity(&self) -> bool {
        self.connectivity
    }

    async fn insert_staging_books(&self, rows: &[StagingBook]) -> Result<u64, EtlError> {
        self.staged.lock().await.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn latest_unprocessed_batch(
        &self,
        _run_date: NaiveDate,
    ) -> Result<Option<String>, EtlError> {
        Ok(self.batch.clone())
    }

    async fn process_cdc_batch(
        &self,
        batch_id: &str,
        run_date: NaiveDate,
    ) -> Result<CdcSummary, EtlError> {
        self.cdc_calls
            .lock()
            .await
            .push((batch_id.to_string(), run_date));
        self.cdc
            .ok_or_else(|| EtlError::Reconciliation(batch_id.to_string()))
    }
}

fn sample_cdc() -> CdcSummary {
    CdcSummary {
        new_books: 2,
        removed_books: 1,
        price_changes: 3,
        stock_changes: 4,
        total_processed: 10,
    }
}

#[tokio::test]
async fn collector_persists_raw_and_stages_rows() {
    let catalog = StubCatalog {
        books: vec![
            raw("A Light in the Attic", "£51.77", "In stock (22 available)"),
            raw("Tipping the Velvet", "Â£53.74", "Out of stock"),
        ],
    };
    let store = MemoryStore::default();
    let warehouse = FakeWarehouse::new();

    let report = collector::run(&catalog, &store, &warehouse, run_date())
        .await
        .unwrap();

    assert_eq!(report.status, "success");
    assert_eq!(report.records_scraped, 2);
    assert_eq!(report.records_inserted, 2);
    assert!(report.batch_id.starts_with("collect_"));
    assert_eq!(report.storage_key, "raw/books/date=2026-08-06/books.json");

    let stored = store.object(&report.storage_key).await.unwrap();
    assert_eq!(stored[0]["title"], "A Light in the Attic");
    assert_eq!(stored[1]["price"], "Â£53.74");

    let staged = warehouse.staged().await;
    assert_eq!(staged.len(), 2);
    assert!(staged[0].is_in_stock);
    assert_eq!(staged[1].price_gbp, 53.74);
    assert!(!staged[1].is_in_stock);
    assert!(staged.iter().all(|r| r.batch_id == report.batch_id));
}

#[tokio::test]
async fn collector_empty_scrape_writes_nothing() {
    let catalog = StubCatalog { books: vec![] };
    let store = MemoryStore::default();
    let warehouse = FakeWarehouse::new();

    let err = collector::run(&catalog, &store, &warehouse, run_date())
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::EmptyResult));
    assert_eq!(err.kind(), "EmptyResultError");
    assert_eq!(store.len().await, 0);
    assert!(warehouse.staged().await.is_empty());
}

#[tokio::test]
async fn collector_insert_count_excludes_malformed_records() {
    let catalog = StubCatalog {
        books: vec![
            raw("Good", "£10.00", "In stock (3 available)"),
            raw("Bad", "not-a-price", "In stock (1 available)"),
            raw("Fine", "£5.00", "Out of stock"),
        ],
    };
    let store = MemoryStore::default();
    let warehouse = FakeWarehouse::new();

    let report = collector::run(&catalog, &store, &warehouse, run_date())
        .await
        .unwrap();

    assert_eq!(report.records_scraped, 3);
    assert_eq!(report.records_inserted, 2);
    // The raw object keeps all three records, malformed price included.
    let stored = store.object(&report.storage_key).await.unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn collector_aborts_when_database_is_unreachable() {
    let catalog = StubCatalog {
        books: vec![raw("A", "£10.00", "In stock (3 available)")],
    };
    let store = MemoryStore::default();
    let warehouse = FakeWarehouse::offline();

    let err = collector::run(&catalog, &store, &warehouse, run_date())
        .await
        .unwrap_err();

    assert!(matches!(err, EtlError::Connectivity(_)));
    assert_eq!(store.len().await, 0);
}

#[tokio::test]
async fn reconciler_reports_missing_upstream_distinctly() {
    let store = MemoryStore::default();
    let warehouse = FakeWarehouse::new().with_batch("collect_2026-08-06_080512");

    let report = reconciler::run(&store, &warehouse, run_date(), None).await;

    assert_eq!(report.status, "error");
    assert_eq!(report.error_type, Some("MissingUpstreamError"));
    assert!(report
        .error_message
        .unwrap()
        .contains("raw/books/date=2026-08-06/books.json"));
    assert!(warehouse.cdc_calls().await.is_empty());
}

#[tokio::test]
async fn reconciler_reports_batch_not_found() {
    let store = MemoryStore::default();
    store
        .put_json(
            &storage::raw_books_key(run_date()),
            &serde_json::to_value(vec![raw("A", "£10.00", "In stock (3 available)")]).unwrap(),
        )
        .await
        .unwrap();
    let warehouse = FakeWarehouse::new().with_cdc(sample_cdc());

    let report = reconciler::run(&store, &warehouse, run_date(), None).await;

    assert_eq!(report.status, "error");
    assert_eq!(report.error_type, Some("BatchNotFoundError"));
    assert!(warehouse.cdc_calls().await.is_empty());
}

#[tokio::test]
async fn reconciler_success_end_to_end() {
    let store = MemoryStore::default();
    store
        .put_json(
            &storage::raw_books_key(run_date()),
            &serde_json::to_value(vec![
                raw("A", "£10.00", "In stock (3 available)"),
                raw("B", "£5.00", "Out of stock"),
            ])
            .unwrap(),
        )
        .await
        .unwrap();
    let warehouse = FakeWarehouse::new()
        .with_batch("collect_2026-08-06_080512")
        .with_cdc(sample_cdc());

    let report = reconciler::run(&store, &warehouse, run_date(), None).await;

    assert_eq!(report.status, "success");
    assert_eq!(report.error_message, None);
    assert_eq!(report.batch_id.as_deref(), Some("collect_2026-08-06_080512"));
    assert_eq!(report.processed_records, 1);

    let summary = report.summary.unwrap();
    assert_eq!(summary.total_books_raw, 2);
    assert_eq!(summary.books_in_stock, 1);
    assert_eq!(summary.books_out_of_stock, 1);
    assert_eq!(summary.total_inventory_value_gbp, 10.00);
    assert_eq!(summary.total_inventory_value_usd, 12.70);
    assert_eq!(summary.average_price_gbp, 10.00);

    // CDC counts pass through exactly as the procedure reported them.
    assert_eq!(report.cdc_summary, Some(sample_cdc()));
    let calls = warehouse.cdc_calls().await;
    assert_eq!(
        calls,
        vec![("collect_2026-08-06_080512".to_string(), run_date())]
    );

    let keys = report.storage_keys.unwrap();
    assert_eq!(keys.processed, "processed/books/date=2026-08-06/books.json");
    assert_eq!(keys.summary, "processed/summary/date=2026-08-06/summary.json");

    let processed = store.object(&keys.processed).await.unwrap();
    let processed = processed.as_array().unwrap();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0]["title"], "A");
    assert_eq!(processed[0]["price_gbp"], 10.00);
    assert_eq!(processed[0]["price_usd"], 12.70);
    assert_eq!(processed[0]["price_eur"], 11.70);

    let summary_obj = store.object(&keys.summary).await.unwrap();
    assert_eq!(summary_obj["total_books_raw"], 2);
    assert_eq!(summary_obj["total_inventory_value_gbp"], 10.0);
}

#[tokio::test]
async fn reconciler_explicit_batch_id_skips_the_lookup() {
    let store = MemoryStore::default();
    store
        .put_json(
            &storage::raw_books_key(run_date()),
            &serde_json::to_value(vec![raw("A", "£10.00", "In stock (3 available)")]).unwrap(),
        )
        .await
        .unwrap();
    // No unprocessed batch recorded: the override must carry the run.
    let warehouse = FakeWarehouse::new().with_cdc(sample_cdc());

    let report = reconciler::run(
        &store,
        &warehouse,
        run_date(),
        Some("collect_2026-08-06_120000".to_string()),
    )
    .await;

    assert_eq!(report.status, "success");
    assert_eq!(
        report.batch_id.as_deref(),
        Some("collect_2026-08-06_120000")
    );
    let calls = warehouse.cdc_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "collect_2026-08-06_120000");
}

#[tokio::test]
async fn reconciler_reports_cdc_empty_result() {
    let store = MemoryStore::default();
    store
        .put_json(
            &storage::raw_books_key(run_date()),
            &serde_json::to_value(vec![raw("A", "£10.00", "In stock (3 available)")]).unwrap(),
        )
        .await
        .unwrap();
    // Batch resolves, but the procedure returns no result row.
    let warehouse = FakeWarehouse::new().with_batch("collect_2026-08-06_080512");

    let report = reconciler::run(&store, &warehouse, run_date(), None).await;

    assert_eq!(report.status, "error");
    assert_eq!(report.error_type, Some("ReconciliationError"));
    assert_eq!(warehouse.cdc_calls().await.len(), 1);
}
