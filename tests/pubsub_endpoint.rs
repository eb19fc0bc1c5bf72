//! Integration tests for the POST /pubsub endpoint

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use pushbridge::{
    router, AppState, ErrorProto, RowInsertError, RowInserter, TableRef, WarehouseError, WarehouseRow,
};

#[derive(Debug, Clone)]
struct InsertCall {
    table: String,
    rows: Vec<WarehouseRow>,
    row_ids: Vec<Option<String>>,
}

enum Outcome {
    Accept,
    Reject(Vec<RowInsertError>),
    Fail(WarehouseError),
}

struct RecordingInserter {
    outcome: Outcome,
    calls: Mutex<Vec<InsertCall>>,
}

impl RecordingInserter {
    fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<InsertCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RowInserter for RecordingInserter {
    async fn insert_rows(
        &self,
        table: &TableRef,
        rows: &[WarehouseRow],
        row_ids: &[Option<String>],
    ) -> Result<Vec<RowInsertError>, WarehouseError> {
        self.calls.lock().unwrap().push(InsertCall {
            table: table.to_string(),
            rows: rows.to_vec(),
            row_ids: row_ids.to_vec(),
        });

        match &self.outcome {
            Outcome::Accept => Ok(Vec::new()),
            Outcome::Reject(errors) => Ok(errors.clone()),
            Outcome::Fail(e) => Err(e.clone()),
        }
    }
}

fn app(inserter: Arc<RecordingInserter>) -> axum::Router {
    let state = AppState::new(inserter, TableRef::new("proj", "raw", "requests"));
    router(Arc::new(state))
}

fn push_body(envelope: &Value, message_id: &str) -> String {
    json!({
        "message": {
            "data": STANDARD.encode(envelope.to_string()),
            "messageId": message_id,
            "message_id": message_id,
            "publishTime": "2024-05-01T10:00:00.5Z",
            "attributes": {"origin": "edge"},
        },
        "subscription": "projects/proj/subscriptions/requests-push",
        "deliveryAttempt": 1,
    })
    .to_string()
}

async fn post(app: axum::Router, body: impl Into<Body>) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/pubsub")
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

#[tokio::test]
async fn test_well_formed_push_is_inserted() {
    let inserter = RecordingInserter::new(Outcome::Accept);
    let envelope = json!({"request_id": "r1", "method": "GET", "headers": {"x": "y"}});

    let (status, body) = post(app(inserter.clone()), push_body(&envelope, "m1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"status": "ok"}));

    let calls = inserter.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].table, "proj.raw.requests");
    assert_eq!(calls[0].row_ids, vec![Some("m1".to_string())]);

    let row = &calls[0].rows[0];
    assert_eq!(row.request_id, Some(json!("r1")));
    assert_eq!(row.method, Some(json!("GET")));
    assert_eq!(row.headers_json.as_deref(), Some(r#"{"x":"y"}"#));
    assert_eq!(row.query_json, None);
    assert_eq!(row.pubsub_message_id, Some(json!("m1")));
    assert_eq!(row.pubsub_publish_time, Some(json!("2024-05-01T10:00:00.5Z")));
    assert_eq!(row.subscription, Some(json!("projects/proj/subscriptions/requests-push")));
    assert_eq!(row.pubsub_attributes_json.as_deref(), Some(r#"{"origin":"edge"}"#));
    assert_eq!(row.delivery_attempt, Some(json!(1)));

    // e.g. 2024-05-01T10:00:01.042Z
    assert_eq!(row.ingested_at.len(), 24);
    assert!(row.ingested_at.ends_with('Z'));
    assert_eq!(&row.ingested_at[19..20], ".");
}

#[tokio::test]
async fn test_missing_message_is_bad_request() {
    let inserter = RecordingInserter::new(Outcome::Accept);

    let (status, body) = post(
        app(inserter.clone()),
        json!({"subscription": "s"}).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "Invalid Pub/Sub push payload");
    assert!(inserter.calls().is_empty());
}

#[tokio::test]
async fn test_missing_data_is_bad_request() {
    let inserter = RecordingInserter::new(Outcome::Accept);

    let (status, _) = post(
        app(inserter.clone()),
        json!({"message": {"messageId": "m1"}}).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(inserter.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_base64_is_bad_request() {
    let inserter = RecordingInserter::new(Outcome::Accept);

    let (status, _) = post(
        app(inserter.clone()),
        json!({"message": {"data": "%%%", "messageId": "m1"}}).to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(inserter.calls().is_empty());
}

#[tokio::test]
async fn test_non_json_data_is_bad_request() {
    let inserter = RecordingInserter::new(Outcome::Accept);
    let body = json!({"message": {"data": STANDARD.encode("hello"), "messageId": "m1"}});

    let (status, body) = post(app(inserter.clone()), body.to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().starts_with("Invalid envelope JSON"));
    assert!(inserter.calls().is_empty());
}

#[tokio::test]
async fn test_non_json_body_is_bad_request() {
    let inserter = RecordingInserter::new(Outcome::Accept);

    let (status, _) = post(app(inserter.clone()), "definitely not json").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(inserter.calls().is_empty());
}

#[tokio::test]
async fn test_metadata_types_are_not_checked_locally() {
    let inserter = RecordingInserter::new(Outcome::Accept);
    let body = json!({
        "message": {
            "data": STANDARD.encode(json!({"request_id": "r1"}).to_string()),
            "messageId": 123,
            "attributes": {"n": 1},
        },
        "deliveryAttempt": "3",
    });

    let (status, _) = post(app(inserter.clone()), body.to_string()).await;

    assert_eq!(status, StatusCode::OK);

    let calls = inserter.calls();
    assert_eq!(calls[0].row_ids, vec![Some("123".to_string())]);

    let row = &calls[0].rows[0];
    assert_eq!(row.pubsub_message_id, Some(json!(123)));
    assert_eq!(row.delivery_attempt, Some(json!("3")));
    assert_eq!(row.pubsub_attributes_json.as_deref(), Some(r#"{"n":1}"#));
}

#[tokio::test]
async fn test_redelivery_reuses_dedup_key() {
    let inserter = RecordingInserter::new(Outcome::Accept);
    let envelope = json!({"request_id": "r9"});

    let (first, _) = post(app(inserter.clone()), push_body(&envelope, "m-dup")).await;
    let (second, _) = post(app(inserter.clone()), push_body(&envelope, "m-dup")).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);

    let calls = inserter.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].row_ids, vec![Some("m-dup".to_string())]);
    assert_eq!(calls[1].row_ids, vec![Some("m-dup".to_string())]);
}

#[tokio::test]
async fn test_request_id_used_without_message_id() {
    let inserter = RecordingInserter::new(Outcome::Accept);
    let body = json!({
        "message": {"data": STANDARD.encode(json!({"request_id": "r5"}).to_string())},
    });

    let (status, _) = post(app(inserter.clone()), body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(inserter.calls()[0].row_ids, vec![Some("r5".to_string())]);
}

#[tokio::test]
async fn test_rejected_rows_return_server_error() {
    let errors = vec![RowInsertError {
        index: 0,
        errors: vec![ErrorProto {
            reason: Some("invalid".to_string()),
            location: Some("received_at".to_string()),
            debug_info: None,
            message: Some("Could not parse 'yesterday' as a timestamp".to_string()),
        }],
    }];
    let inserter = RecordingInserter::new(Outcome::Reject(errors));
    let envelope = json!({"request_id": "r1", "received_at": "yesterday"});

    let (status, body) = post(app(inserter.clone()), push_body(&envelope, "m1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({
            "bq_errors": [{
                "index": 0,
                "errors": [{
                    "reason": "invalid",
                    "location": "received_at",
                    "message": "Could not parse 'yesterday' as a timestamp",
                }],
            }],
        })
    );
    assert_eq!(inserter.calls().len(), 1);
}

#[tokio::test]
async fn test_insert_failure_returns_server_error() {
    let inserter = RecordingInserter::new(Outcome::Fail(WarehouseError::Transport(
        "connection reset".to_string(),
    )));

    let (status, body) = post(app(inserter.clone()), push_body(&json!({}), "m1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(body).unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_health() {
    let inserter = RecordingInserter::new(Outcome::Accept);

    let response = app(inserter)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
}
