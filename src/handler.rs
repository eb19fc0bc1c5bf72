//! Push ingest endpoint
//!
//! `POST /pubsub` decodes one push delivery, maps it to a warehouse row and
//! inserts it with the message id as deduplication key.

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::BridgeError;
use crate::push::decode_push;
use crate::row::{build_row, dedup_key};
use crate::warehouse::{RowInserter, TableRef};

/// Application state shared across handlers
pub struct AppState {
    pub inserter: Arc<dyn RowInserter>,
    pub table: TableRef,
}

impl AppState {
    pub fn new(inserter: Arc<dyn RowInserter>, table: TableRef) -> Self {
        Self { inserter, table }
    }
}

/// Acknowledgment returned once the row is stored
#[derive(Debug, Serialize)]
pub struct PushAck {
    pub status: &'static str,
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/pubsub", post(pubsub_push))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle one push delivery
pub async fn pubsub_push(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PushAck>, BridgeError> {
    let decoded = decode_push(&body).map_err(|e| {
        tracing::warn!("Rejecting malformed push delivery: {}", e);
        BridgeError::from(e)
    })?;

    tracing::debug!(
        "Decoded push message {:?} from {:?}",
        decoded.meta.message_id,
        decoded.meta.subscription
    );

    let row = build_row(&decoded, Utc::now()).map_err(|e| {
        tracing::warn!("Could not map push delivery to a row: {}", e);
        BridgeError::MalformedPayload(e.to_string())
    })?;
    let insert_id = dedup_key(&decoded);

    let errors = state
        .inserter
        .insert_rows(&state.table, &[row], &[insert_id.clone()])
        .await
        .map_err(|e| {
            tracing::error!("Insert into {} failed: {}", state.table, e);
            BridgeError::from(e)
        })?;

    if !errors.is_empty() {
        tracing::error!(
            "Warehouse rejected row for message {:?}: {:?}",
            decoded.meta.message_id,
            errors
        );
        return Err(BridgeError::RowsRejected(errors));
    }

    tracing::info!(
        "Inserted message {:?} into {} (insert id {:?})",
        decoded.meta.message_id,
        state.table,
        insert_id
    );

    Ok(Json(PushAck { status: "ok" }))
}

/// Liveness check
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "pushbridge",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
