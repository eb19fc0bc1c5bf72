/// BigQuery streaming inserts over the tabledata.insertAll REST API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{RowInsertError, RowInserter, TableRef, TokenSource, WarehouseError};
use crate::config::BridgeConfig;
use crate::row::WarehouseRow;

#[derive(Serialize)]
struct InsertAllRequest<'a> {
    kind: &'static str,
    rows: Vec<InsertAllRow<'a>>,
}

#[derive(Serialize)]
struct InsertAllRow<'a> {
    #[serde(rename = "insertId", skip_serializing_if = "Option::is_none")]
    insert_id: Option<&'a str>,
    json: &'a WarehouseRow,
}

#[derive(Deserialize)]
struct InsertAllResponse {
    #[serde(rename = "insertErrors", default)]
    insert_errors: Vec<RowInsertError>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Shared BigQuery client; safe for concurrent use by in-flight requests
pub struct BigQueryClient {
    http: reqwest::Client,
    api_base: String,
    tokens: TokenSource,
}

impl BigQueryClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, tokens: TokenSource) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            tokens,
        }
    }

    /// Build a client from process configuration
    pub fn from_config(config: &BridgeConfig) -> Result<Self, WarehouseError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WarehouseError::Transport(e.to_string()))?;

        let tokens = match &config.access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::metadata(&config.metadata_host),
        };

        Ok(Self::new(http, config.api_base.clone(), tokens))
    }

    fn insert_all_url(&self, table: &TableRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            self.api_base, table.project, table.dataset, table.table
        )
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl RowInserter for BigQueryClient {
    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: &[WarehouseRow],
        row_ids: &[Option<String>],
    ) -> Result<Vec<RowInsertError>, WarehouseError> {
        if rows.len() != row_ids.len() {
            return Err(WarehouseError::InvalidRequest(format!(
                "{} rows but {} row ids",
                rows.len(),
                row_ids.len()
            )));
        }

        let request = InsertAllRequest {
            kind: "bigquery#tableDataInsertAllRequest",
            rows: rows
                .iter()
                .zip(row_ids)
                .map(|(row, id)| InsertAllRow {
                    insert_id: id.as_deref(),
                    json: row,
                })
                .collect(),
        };

        let token = self.tokens.token(&self.http).await?;

        let response = self
            .http
            .post(self.insert_all_url(table))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| WarehouseError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: InsertAllResponse = response
            .json()
            .await
            .map_err(|e| WarehouseError::Decode(e.to_string()))?;

        tracing::debug!(
            "insertAll into {} returned {} row errors",
            table,
            parsed.insert_errors.len()
        );

        Ok(parsed.insert_errors)
    }
}
