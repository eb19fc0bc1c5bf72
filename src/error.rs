//! Bridge error type and its HTTP mapping
//!
//! The status code is the only signal the push subscription sees: 400 marks a
//! delivery as permanently malformed, 500 asks for redelivery.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::push::DecodeError;
use crate::warehouse::{RowInsertError, WarehouseError};

#[derive(Debug)]
pub enum BridgeError {
    MalformedPayload(String),
    RowsRejected(Vec<RowInsertError>),
    Warehouse(WarehouseError),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::MalformedPayload(msg) => write!(f, "{}", msg),
            BridgeError::RowsRejected(errors) => {
                write!(f, "Warehouse rejected {} row(s)", errors.len())
            }
            BridgeError::Warehouse(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<DecodeError> for BridgeError {
    fn from(e: DecodeError) -> Self {
        BridgeError::MalformedPayload(e.to_string())
    }
}

impl From<WarehouseError> for BridgeError {
    fn from(e: WarehouseError) -> Self {
        BridgeError::Warehouse(e)
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        match self {
            BridgeError::MalformedPayload(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            BridgeError::RowsRejected(errors) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "bq_errors": errors })),
            )
                .into_response(),
            BridgeError::Warehouse(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}
