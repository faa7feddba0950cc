//! Catalog page fetch and extraction.
use crate::error::EtlError;
use crate::model::RawBook;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::info;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static BOOK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".product_pod").expect("valid selector"));
static TITLE_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h3 a").expect("valid selector"));
static PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".price_color").expect("valid selector"));
static AVAILABILITY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".availability").expect("valid selector"));

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawBook>, EtlError>;
}

/// HTTP implementation over the configured catalog URL.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    http: Client,
    base_url: String,
}

impl HttpCatalogSource {
    pub fn new(base_url: &str) -> Self {
        let http = Client::builder()
            .user_agent("books-etl/0.1")
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<Vec<RawBook>, EtlError> {
        info!(url = %self.base_url, "fetching catalog page");
        let response = self
            .http
            .get(&self.base_url)
            .send()
            .await
            .map_err(|err| EtlError::Scrape(err.to_string()))?
            .error_for_status()
            .map_err(|err| EtlError::Scrape(err.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|err| EtlError::Scrape(err.to_string()))?;
        Ok(extract_books(&body))
    }
}

/// Extract one record per catalog entry using the fixed selector set:
/// title attribute of the `h3` link, price text, trimmed availability text.
/// Entries missing any of the three are dropped.
pub fn extract_books(html: &str) -> Vec<RawBook> {
    let document = Html::parse_document(html);
    document
        .select(&BOOK)
        .filter_map(|entry| {
            let title = entry
                .select(&TITLE_LINK)
                .next()?
                .value()
                .attr("title")?
                .to_string();
            let price = entry.select(&PRICE).next()?.text().collect::<String>();
            let availability = entry
                .select(&AVAILABILITY)
                .next()?
                .text()
                .collect::<String>()
                .trim()
                .to_string();
            Some(RawBook {
                title,
                price,
                availability,
            })
        })
        .collect()
}
