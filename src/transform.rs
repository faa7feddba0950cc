//! Price parsing, availability checks and the raw → processed derivation.
use crate::model::{DailySummary, ProcessedBook, RawBook};
use chrono::{DateTime, NaiveDate, Utc};
use std::num::ParseFloatError;
use tracing::warn;

/// Fixed conversion rates applied to the source (GBP) price.
pub const GBP_TO_USD: f64 = 1.27;
pub const GBP_TO_EUR: f64 = 1.17;

/// Parse a GBP price string to a decimal value.
///
/// Strips the pound symbol and the mis-encoded `Â` variant the source page
/// sometimes emits (`"£51.77"` and `"Â£51.77"` both parse to 51.77).
pub fn parse_price(price: &str) -> Result<f64, ParseFloatError> {
    price.replace('Â', "").replace('£', "").trim().parse()
}

/// Substring check against the availability text.
pub fn is_in_stock(availability: &str) -> bool {
    availability.contains("In stock")
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Derive the processed record set and the daily summary from one run's raw
/// records.
///
/// Out-of-stock books are dropped from the processed set but still counted
/// in the summary. A record whose price fails to parse is logged and
/// skipped; it never aborts the batch.
pub fn transform(
    raw: &[RawBook],
    run_date: NaiveDate,
    now: DateTime<Utc>,
) -> (Vec<ProcessedBook>, DailySummary) {
    let mut processed = Vec::new();
    let mut total_value_gbp = 0.0;
    let mut in_stock_count = 0usize;
    let mut out_of_stock_count = 0usize;

    for book in raw {
        let price_gbp = match parse_price(&book.price) {
            Ok(price) => price,
            Err(err) => {
                warn!(title = %book.title, price = %book.price, %err, "skipping record: unparseable price");
                continue;
            }
        };

        if is_in_stock(&book.availability) {
            in_stock_count += 1;
            total_value_gbp += price_gbp;
            processed.push(ProcessedBook {
                title: book.title.clone(),
                price_gbp: round2(price_gbp),
                price_usd: round2(price_gbp * GBP_TO_USD),
                price_eur: round2(price_gbp * GBP_TO_EUR),
                in_stock: true,
                availability: book.availability.clone(),
                processed_at: now,
            });
        } else {
            out_of_stock_count += 1;
        }
    }

    let (average_price_gbp, average_price_usd) = if in_stock_count > 0 {
        (
            round2(total_value_gbp / in_stock_count as f64),
            round2(total_value_gbp * GBP_TO_USD / in_stock_count as f64),
        )
    } else {
        (0.0, 0.0)
    };

    let summary = DailySummary {
        date: run_date,
        total_books_raw: raw.len(),
        books_in_stock: in_stock_count,
        books_out_of_stock: out_of_stock_count,
        total_inventory_value_gbp: round2(total_value_gbp),
        total_inventory_value_usd: round2(total_value_gbp * GBP_TO_USD),
        average_price_gbp,
        average_price_usd,
        processed_at: now,
    };

    (processed, summary)
}
