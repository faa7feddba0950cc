//! Credential resolution for the warehouse connection.
//!
//! Secrets are JSON documents fetched by name from a [`SecretStore`]. The
//! [`CachedSecrets`] wrapper caches each secret for the lifetime of the
//! process and never invalidates it: credentials are static per deployment,
//! rotation means restarting.
use crate::error::EtlError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<Value, EtlError>;
}

/// File-backed secret store: the secret named `a/b/c` lives at
/// `<dir>/a/b/c.json` and holds the credential document as JSON.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch(&self, name: &str) -> Result<Value, EtlError> {
        let path = self.dir.join(format!("{name}.json"));
        let content = tokio::fs::read_to_string(&path).await.map_err(|err| {
            EtlError::Configuration(format!("secret {name} not readable at {}: {err}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|err| EtlError::Configuration(format!("secret {name} is not valid JSON: {err}")))
    }
}

/// Process-lifetime secret cache keyed by secret name.
pub struct CachedSecrets<S> {
    inner: S,
    cache: Mutex<HashMap<String, Value>>,
}

impl<S> CachedSecrets<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: SecretStore> SecretStore for CachedSecrets<S> {
    async fn fetch(&self, name: &str) -> Result<Value, EtlError> {
        let mut cache = self.cache.lock().await;
        if let Some(value) = cache.get(name) {
            debug!(name, "using cached secret");
            return Ok(value.clone());
        }
        info!(name, "retrieving secret from store");
        let value = self.inner.fetch(name).await?;
        cache.insert(name.to_string(), value.clone());
        Ok(value)
    }
}

/// Warehouse credential document. All five fields are required.
#[derive(Debug, Clone, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: String,
}

impl DbCredentials {
    pub fn from_secret(value: &Value) -> Result<Self, EtlError> {
        const REQUIRED: [&str; 5] = ["host", "port", "dbname", "username", "password"];
        let missing: Vec<&str> = REQUIRED
            .iter()
            .filter(|field| value.get(**field).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(EtlError::Configuration(format!(
                "missing required fields in secret: {}",
                missing.join(", ")
            )));
        }
        serde_json::from_value(value.clone())
            .map_err(|err| EtlError::Configuration(format!("invalid secret document: {err}")))
    }
}
