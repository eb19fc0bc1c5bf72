//! Pub/Sub push delivery decoding
//!
//! A push delivery wraps one Pub/Sub message in a JSON body. The message's `data`
//! field carries the base64-encoded application envelope describing the original
//! HTTP request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Error type for push decoding
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    InvalidBody(String),
    MissingData,
    InvalidBase64(String),
    InvalidUtf8(String),
    InvalidEnvelope(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidBody(msg) => write!(f, "Invalid push body: {}", msg),
            DecodeError::MissingData => write!(f, "Invalid Pub/Sub push payload"),
            DecodeError::InvalidBase64(msg) => write!(f, "Invalid base64 in message.data: {}", msg),
            DecodeError::InvalidUtf8(msg) => write!(f, "message.data is not UTF-8: {}", msg),
            DecodeError::InvalidEnvelope(msg) => write!(f, "Invalid envelope JSON: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Outer push body as delivered to the endpoint
///
/// Only `message.data` is typed; delivery metadata is carried as raw JSON and
/// left for the warehouse to type-check.
#[derive(Debug, Deserialize)]
struct PushBody {
    message: Option<PushMessage>,
    #[serde(rename = "deliveryAttempt")]
    delivery_attempt: Option<Value>,
    subscription: Option<Value>,
}

/// Pub/Sub sends both casings of the id and publish time fields
#[derive(Debug, Deserialize)]
struct PushMessage {
    data: Option<String>,
    #[serde(rename = "messageId")]
    message_id_camel: Option<Value>,
    message_id: Option<Value>,
    #[serde(rename = "publishTime")]
    publish_time_camel: Option<Value>,
    publish_time: Option<Value>,
    attributes: Option<Value>,
}

/// Delivery metadata taken from the push body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushMetadata {
    pub message_id: Option<Value>,
    pub publish_time: Option<Value>,
    pub delivery_attempt: Option<Value>,
    pub subscription: Option<Value>,
    pub attributes: Option<Value>,
}

/// Application envelope decoded from `message.data`
///
/// Every field is optional and copied verbatim into the row; the warehouse
/// enforces column types.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppEnvelope {
    pub received_at: Option<Value>,
    pub request_id: Option<Value>,
    pub source: Option<Value>,
    pub method: Option<Value>,
    pub path: Option<Value>,
    pub content_type: Option<Value>,
    pub remote_ip: Option<Value>,
    pub user_agent: Option<Value>,
    pub headers: Option<Value>,
    pub query: Option<Value>,
    pub body_text: Option<Value>,
    pub body_json: Option<Value>,
    pub body_is_base64: Option<Value>,
}

/// A fully decoded push delivery
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPush {
    pub envelope: AppEnvelope,
    pub meta: PushMetadata,
}

fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.is_empty())
}

// An empty string counts as missing; any other value is kept as sent
fn first_present(primary: Option<Value>, fallback: Option<Value>) -> Option<Value> {
    primary
        .filter(|v| !is_blank(v))
        .or(fallback.filter(|v| !is_blank(v)))
}

/// Decode a raw push request body into the envelope and delivery metadata
pub fn decode_push(body: &[u8]) -> Result<DecodedPush, DecodeError> {
    let push: PushBody =
        serde_json::from_slice(body).map_err(|e| DecodeError::InvalidBody(e.to_string()))?;

    let message = push.message.ok_or(DecodeError::MissingData)?;
    let data = message.data.as_deref().ok_or(DecodeError::MissingData)?;

    let envelope = decode_envelope(data)?;

    let meta = PushMetadata {
        message_id: first_present(message.message_id_camel, message.message_id),
        publish_time: first_present(message.publish_time_camel, message.publish_time),
        delivery_attempt: push.delivery_attempt,
        subscription: push.subscription,
        attributes: message.attributes,
    };

    Ok(DecodedPush { envelope, meta })
}

/// Decode the base64 `data` field into an application envelope
pub fn decode_envelope(data: &str) -> Result<AppEnvelope, DecodeError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))?;

    let value: Value =
        serde_json::from_str(&text).map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::InvalidEnvelope("expected a JSON object".to_string()));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))
}
