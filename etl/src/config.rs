//! Configuration from the environment.
//!
//! | Variable                 | Default              |
//! |--------------------------|----------------------|
//! | `LISTINGS_SOURCE_DIR`    | `data`               |
//! | `LISTINGS_DATA_API_URL`  | unset                |
//! | `LISTINGS_DATA_API_KEY`  | unset                |
//! | `LISTINGS_DATA_SOURCE`   | `Cluster0`           |
//! | `LISTINGS_DATABASE`      | `AirBnbDB`           |
//! | `LISTINGS_OUTPUT_DIR`    | `.`                  |
//! | `LISTINGS_LOG_DIR`       | `logs`               |
//! | `LISTINGS_RUNS_DIR`      | `.listings-etl/runs` |
//!
//! Empty variables count as unset.

use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const SOURCE_DIR_VAR: &str = "LISTINGS_SOURCE_DIR";
pub const DATA_API_URL_VAR: &str = "LISTINGS_DATA_API_URL";
pub const DATA_API_KEY_VAR: &str = "LISTINGS_DATA_API_KEY";
pub const DATA_SOURCE_VAR: &str = "LISTINGS_DATA_SOURCE";
pub const DATABASE_VAR: &str = "LISTINGS_DATABASE";
pub const OUTPUT_DIR_VAR: &str = "LISTINGS_OUTPUT_DIR";
pub const LOG_DIR_VAR: &str = "LISTINGS_LOG_DIR";
pub const RUNS_DIR_VAR: &str = "LISTINGS_RUNS_DIR";

/// Connection settings for the HTTP document store
#[derive(Debug, Clone, PartialEq)]
pub struct DataApiSettings {
    pub base_url: String,
    pub api_key: String,
    pub data_source: String,
    pub database: String,
}

/// Settings for one ETL invocation
#[derive(Debug, Clone, PartialEq)]
pub struct EtlConfig {
    /// Directory store; used when no HTTP store is configured
    pub source_dir: PathBuf,
    pub data_api: Option<DataApiSettings>,
    /// Where `<collection>.db` and `<collection>.xlsx` are written
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub runs_dir: PathBuf,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data"),
            data_api: None,
            output_dir: PathBuf::from("."),
            log_dir: PathBuf::from("logs"),
            runs_dir: PathBuf::from(".listings-etl/runs"),
        }
    }
}

impl EtlConfig {
    /// Read the process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read settings through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let data_api = match get(DATA_API_URL_VAR) {
            Some(base_url) => {
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(ConfigError::Invalid {
                        name: DATA_API_URL_VAR.to_string(),
                        message: format!("expected an http(s) URL, got '{}'", base_url),
                    });
                }
                let api_key = get(DATA_API_KEY_VAR).ok_or_else(|| ConfigError::Missing {
                    name: DATA_API_KEY_VAR.to_string(),
                    because: DATA_API_URL_VAR.to_string(),
                })?;
                Some(DataApiSettings {
                    base_url,
                    api_key,
                    data_source: get(DATA_SOURCE_VAR).unwrap_or_else(|| "Cluster0".to_string()),
                    database: get(DATABASE_VAR).unwrap_or_else(|| "AirBnbDB".to_string()),
                })
            }
            None => None,
        };

        Ok(Self {
            source_dir: get(SOURCE_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.source_dir),
            data_api,
            output_dir: get(OUTPUT_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.output_dir),
            log_dir: get(LOG_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.log_dir),
            runs_dir: get(RUNS_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.runs_dir),
        })
    }

    /// `<output_dir>/<collection>.db`
    pub fn relational_path(&self, collection: &str) -> PathBuf {
        self.output_dir.join(format!("{}.db", collection))
    }

    /// `<output_dir>/<collection>.xlsx`
    pub fn spreadsheet_path(&self, collection: &str) -> PathBuf {
        self.output_dir.join(format!("{}.xlsx", collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EtlConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EtlConfig::default());
        assert_eq!(config.relational_path("listado"), PathBuf::from("./listado.db"));
    }

    #[test]
    fn test_data_api_settings() {
        let config = EtlConfig::from_lookup(lookup(&[
            (DATA_API_URL_VAR, "https://data.example.com/app/v1"),
            (DATA_API_KEY_VAR, "key"),
            (DATABASE_VAR, "Listings"),
        ]))
        .unwrap();

        let api = config.data_api.unwrap();
        assert_eq!(api.api_key, "key");
        assert_eq!(api.data_source, "Cluster0");
        assert_eq!(api.database, "Listings");
    }

    #[test]
    fn test_url_requires_key() {
        let err = EtlConfig::from_lookup(lookup(&[(DATA_API_URL_VAR, "https://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn test_invalid_url() {
        let err = EtlConfig::from_lookup(lookup(&[(DATA_API_URL_VAR, "ftp://x"), (DATA_API_KEY_VAR, "k")])).unwrap_err();
        assert!(err.to_string().contains(DATA_API_URL_VAR));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = EtlConfig::from_lookup(lookup(&[(OUTPUT_DIR_VAR, "  "), (DATA_API_URL_VAR, "")])).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert!(config.data_api.is_none());
    }
}
