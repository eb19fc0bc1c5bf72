//! # pushbridge
//!
//! HTTP bridge between a Pub/Sub push subscription and a BigQuery table.
//!
//! Each push delivery carries a base64-encoded JSON envelope describing an HTTP
//! request received elsewhere. The bridge decodes it, maps it onto a fixed row
//! layout and streams the row into the table, using the Pub/Sub message id as
//! insert id so redeliveries are deduplicated by BigQuery.
//!
//! Response codes drive redelivery:
//!
//! - `200` - row stored
//! - `400` - delivery is malformed
//! - `500` - insert failed or rows were rejected; Pub/Sub retries

pub mod config;
pub mod error;
pub mod handler;
pub mod push;
pub mod row;
pub mod warehouse;

pub use config::{BridgeConfig, ConfigError};
pub use error::BridgeError;
pub use handler::{router, AppState, PushAck};
pub use push::{decode_push, AppEnvelope, DecodeError, DecodedPush, PushMetadata};
pub use row::{build_row, dedup_key, WarehouseRow};
pub use warehouse::{
    BigQueryClient, ErrorProto, RowInsertError, RowInserter, TableRef, TokenSource, WarehouseError,
};
