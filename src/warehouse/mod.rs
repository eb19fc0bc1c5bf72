/// Warehouse streaming-insert integration
///
/// The handler talks to the warehouse only through [`RowInserter`], so tests can
/// substitute a recording implementation for the BigQuery client.

pub mod bigquery;
pub mod token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::row::WarehouseRow;

pub use bigquery::BigQueryClient;
pub use token::TokenSource;

/// Fully-qualified destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Errors reported for one rejected row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInsertError {
    pub index: u32,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

/// Single error descriptor as returned by the insertAll API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error type for failed insert calls (as opposed to rejected rows)
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseError {
    InvalidRequest(String),
    Auth(String),
    Transport(String),
    Api { status: u16, message: String },
    Decode(String),
}

impl fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseError::InvalidRequest(msg) => write!(f, "Invalid insert request: {}", msg),
            WarehouseError::Auth(msg) => write!(f, "Access token unavailable: {}", msg),
            WarehouseError::Transport(msg) => write!(f, "Warehouse request failed: {}", msg),
            WarehouseError::Api { status, message } => {
                write!(f, "Warehouse API returned {}: {}", status, message)
            }
            WarehouseError::Decode(msg) => write!(f, "Unreadable warehouse response: {}", msg),
        }
    }
}

impl std::error::Error for WarehouseError {}

/// Streaming insert into a warehouse table
///
/// `row_ids` runs parallel to `rows`; a `None` entry inserts without a
/// deduplication key. An empty result means every row was accepted.
#[async_trait]
pub trait RowInserter: Send + Sync {
    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: &[WarehouseRow],
        row_ids: &[Option<String>],
    ) -> Result<Vec<RowInsertError>, WarehouseError>;
}
