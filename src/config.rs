//! Process configuration
//!
//! All settings come from the environment. The binary loads a `.env` file first,
//! so local runs can keep them there.

use std::fmt;
use std::time::Duration;

use crate::warehouse::TableRef;

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Error type for configuration loading
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(name) => {
                write!(f, "Required environment variable {} is not set", name)
            }
            ConfigError::Invalid { name, value } => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Settings for the bridge process
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Destination table (`project.dataset.table`)
    pub table: TableRef,

    /// BigQuery REST base URL
    pub api_base: String,

    /// Static bearer token; when unset tokens come from the metadata server
    pub access_token: Option<String>,

    /// Metadata server host used for token lookups
    pub metadata_host: String,

    /// Deadline for each warehouse call
    pub timeout: Duration,
}

impl BridgeConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let table = TableRef::new(
            required("BQ_PROJECT_ID")?,
            required("BQ_DATASET_ID")?,
            required("BQ_TABLE_ID")?,
        );

        let timeout_secs = match lookup("BQ_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "BQ_TIMEOUT_SECS",
                value: raw,
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            table,
            api_base: lookup("BQ_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_token: lookup("BQ_ACCESS_TOKEN").filter(|t| !t.is_empty()),
            metadata_host: lookup("GCE_METADATA_HOST")
                .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
