//! Configuration loader and validator for the books ETL jobs.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub storage: Storage,
    pub database: Database,
    pub catalog: Catalog,
}

/// Object-store settings. `root` is the local mount the bucket lives under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Storage {
    pub bucket: String,
    pub root: String,
}

/// Warehouse connection settings. Credentials themselves come from the
/// secret store, never from this file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    pub secret_name: String,
    pub secrets_dir: String,
    #[serde(default)]
    pub pool_min_size: u32,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Source catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub base_url: String,
}

fn default_pool_max_size() -> u32 {
    2
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.storage.bucket.trim().is_empty() {
        return Err(ConfigError::Invalid("storage.bucket must be non-empty"));
    }
    if cfg.storage.root.trim().is_empty() {
        return Err(ConfigError::Invalid("storage.root must be non-empty"));
    }

    if cfg.database.secret_name.trim().is_empty() {
        return Err(ConfigError::Invalid("database.secret_name must be non-empty"));
    }
    if cfg.database.secrets_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("database.secrets_dir must be non-empty"));
    }
    if cfg.database.pool_max_size == 0 {
        return Err(ConfigError::Invalid("database.pool_max_size must be > 0"));
    }
    if cfg.database.pool_min_size > cfg.database.pool_max_size {
        return Err(ConfigError::Invalid(
            "database.pool_min_size must not exceed database.pool_max_size",
        ));
    }

    if cfg.catalog.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("catalog.base_url must be non-empty"));
    }

    Ok(())
}

/// Returns an example YAML document matching the schema.
pub fn example() -> &'static str {
    r#"storage:
  bucket: "books-etl"
  root: "./data"

database:
  secret_name: "books-etl/warehouse/credentials"
  secrets_dir: "./secrets"
  pool_min_size: 0
  pool_max_size: 2

catalog:
  base_url: "https://books.toscrape.com/"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.database.pool_min_size, 0);
        assert_eq!(cfg.database.pool_max_size, 2);
    }

    #[test]
    fn pool_sizes_default_when_omitted() {
        let cfg: Config = serde_yaml::from_str(
            r#"storage:
  bucket: "books-etl"
  root: "./data"
database:
  secret_name: "books-etl/warehouse/credentials"
  secrets_dir: "./secrets"
catalog:
  base_url: "https://books.toscrape.com/"
"#,
        )
        .unwrap();
        assert_eq!(cfg.database.pool_min_size, 0);
        assert_eq!(cfg.database.pool_max_size, 2);
    }

    #[test]
    fn invalid_bucket() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.storage.bucket = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("storage.bucket")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_secret_name() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.database.secret_name = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("secret_name")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_pool_sizes() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.database.pool_max_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.database.pool_min_size = 5;
        cfg.database.pool_max_size = 2;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        let mut f = fs::File::create(&p).unwrap();
        f.write_all(example().as_bytes()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.catalog.base_url, "https://books.toscrape.com/");
    }
}
