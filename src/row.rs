//! Warehouse row mapping
//!
//! Maps a decoded push delivery onto the fixed column layout of the destination
//! table. Structured sub-objects are stored as compact JSON strings.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::push::DecodedPush;

/// One row of the destination table
///
/// Absent values serialize as `null`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WarehouseRow {
    // TIMESTAMP
    pub received_at: Option<Value>,
    pub pubsub_publish_time: Option<Value>,
    pub ingested_at: String,

    // STRING
    pub request_id: Option<Value>,
    pub source: Option<Value>,
    pub method: Option<Value>,
    pub path: Option<Value>,
    pub content_type: Option<Value>,
    pub remote_ip: Option<Value>,
    pub user_agent: Option<Value>,
    pub headers_json: Option<String>,
    pub query_json: Option<String>,
    pub body_text: Option<Value>,
    pub body_json: Option<String>,
    pub pubsub_message_id: Option<Value>,
    pub subscription: Option<Value>,
    pub pubsub_attributes_json: Option<String>,

    // INTEGER / BOOLEAN
    pub delivery_attempt: Option<Value>,
    pub body_is_base64: Option<Value>,
}

/// Serialize a value as compact JSON, keeping non-ASCII characters literal
pub fn compact_json<T: Serialize + ?Sized>(value: Option<&T>) -> Result<Option<String>, serde_json::Error> {
    value.map(serde_json::to_string).transpose()
}

/// Format a UTC instant the way the `ingested_at` column expects
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Build the row for a decoded delivery, stamping `ingested_at` with `now`
pub fn build_row(decoded: &DecodedPush, now: DateTime<Utc>) -> Result<WarehouseRow, serde_json::Error> {
    let envelope = &decoded.envelope;
    let meta = &decoded.meta;

    Ok(WarehouseRow {
        received_at: envelope.received_at.clone(),
        pubsub_publish_time: meta.publish_time.clone(),
        ingested_at: format_timestamp(now),

        request_id: envelope.request_id.clone(),
        source: envelope.source.clone(),
        method: envelope.method.clone(),
        path: envelope.path.clone(),
        content_type: envelope.content_type.clone(),
        remote_ip: envelope.remote_ip.clone(),
        user_agent: envelope.user_agent.clone(),
        headers_json: compact_json(envelope.headers.as_ref())?,
        query_json: compact_json(envelope.query.as_ref())?,
        body_text: envelope.body_text.clone(),
        body_json: compact_json(envelope.body_json.as_ref())?,
        pubsub_message_id: meta.message_id.clone(),
        subscription: meta.subscription.clone(),
        pubsub_attributes_json: compact_json(meta.attributes.as_ref())?,

        delivery_attempt: meta.delivery_attempt.clone(),
        body_is_base64: envelope.body_is_base64.clone(),
    })
}

/// Deduplication key for the insert: the push message id, else the request id
pub fn dedup_key(decoded: &DecodedPush) -> Option<String> {
    key_text(decoded.meta.message_id.as_ref())
        .or_else(|| key_text(decoded.envelope.request_id.as_ref()))
}

fn key_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
