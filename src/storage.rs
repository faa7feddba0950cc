//! Object storage behind a narrow trait.
//!
//! Keys are a logical contract other tooling depends on:
//! `raw/books/date=<date>/books.json`,
//! `processed/books/date=<date>/books.json`,
//! `processed/summary/date=<date>/summary.json`.
use crate::error::EtlError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

pub fn raw_books_key(date: NaiveDate) -> String {
    format!("raw/books/date={date}/books.json")
}

pub fn processed_books_key(date: NaiveDate) -> String {
    format!("processed/books/date={date}/books.json")
}

pub fn summary_key(date: NaiveDate) -> String {
    format!("processed/summary/date={date}/summary.json")
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a JSON object, replacing any existing object at the key.
    async fn put_json(&self, key: &str, body: &Value) -> Result<(), EtlError>;

    /// Read a JSON object; `Ok(None)` when the key does not exist, so
    /// callers can distinguish absence from storage failure.
    async fn get_json(&self, key: &str) -> Result<Option<Value>, EtlError>;
}

/// Filesystem-backed store rooted at `<root>/<bucket>`, standing in for the
/// managed object store.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: &str) -> Self {
        Self {
            root: root.into().join(bucket),
        }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_json(&self, key: &str, body: &Value) -> Result<(), EtlError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                EtlError::Storage(format!("creating {}: {err}", parent.display()))
            })?;
        }
        let bytes = serde_json::to_vec_pretty(body)
            .map_err(|err| EtlError::Storage(format!("serializing {key}: {err}")))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|err| EtlError::Storage(format!("writing {key}: {err}")))?;
        info!(key, "object written");
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<Value>, EtlError> {
        let path = self.object_path(key);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(EtlError::Storage(format!("reading {key}: {err}"))),
        };
        let value = serde_json::from_slice(&content)
            .map_err(|err| EtlError::Storage(format!("parsing {key}: {err}")))?;
        Ok(Some(value))
    }
}
