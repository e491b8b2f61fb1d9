//! HTTP adapter tests against in-memory backends.

use axum::http::StatusCode;
use axum_test::TestServer;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imgflow_api::setup::routes::setup_routes;
use imgflow_api::AppState;
use imgflow_core::{Config, MonotonicClock};
use imgflow_db::InMemoryMarkerStore;
use imgflow_storage::InMemoryStorage;
use imgflow_worker::Dispatcher;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

const BUCKET: &str = "uploads";

struct TestApp {
    server: TestServer,
    storage: Arc<InMemoryStorage>,
    markers: Arc<InMemoryMarkerStore>,
}

fn test_config(max_payload_bytes: usize) -> Config {
    let vars: HashMap<&str, String> = [
        ("STALENESS_WINDOW_SECS", "300".to_string()),
        ("MAX_ATTEMPTS", "3".to_string()),
        ("RETRY_BACKOFF_BASE_SECS", "2".to_string()),
        ("RETRY_BACKOFF_MAX_SECS", "60".to_string()),
        ("STORAGE_BACKEND", "memory".to_string()),
        ("MARKER_BACKEND", "memory".to_string()),
        ("RESIZE_MAX_WIDTH", "64".to_string()),
        ("RESIZE_MAX_HEIGHT", "64".to_string()),
        ("MAX_PAYLOAD_BYTES", max_payload_bytes.to_string()),
    ]
    .into_iter()
    .collect();
    let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
    config.validate().unwrap();
    config
}

fn setup_test_app_with_limit(max_payload_bytes: usize) -> TestApp {
    let config = test_config(max_payload_bytes);
    let storage = Arc::new(InMemoryStorage::new());
    let markers = Arc::new(InMemoryMarkerStore::new());
    let dispatcher = Dispatcher::new(
        &config,
        storage.clone(),
        markers.clone(),
        Arc::new(MonotonicClock::new()),
    )
    .unwrap();
    let state = Arc::new(AppState::new(config.clone(), dispatcher, markers.clone()));
    let server = TestServer::new(setup_routes(&config, state)).unwrap();

    TestApp {
        server,
        storage,
        markers,
    }
}

fn setup_test_app() -> TestApp {
    setup_test_app_with_limit(1024 * 1024)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([9, 99, 199])));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

fn s3_record(key: &str) -> Value {
    json!({
        "eventSource": "aws:s3",
        "eventName": "ObjectCreated:Put",
        "eventTime": "2024-05-01T12:00:00.000Z",
        "s3": {
            "bucket": { "name": BUCKET },
            "object": { "key": key, "size": 512, "eTag": "etag-1" }
        }
    })
}

fn sns_wrapped(records: Vec<Value>) -> Value {
    json!({
        "Type": "Notification",
        "MessageId": "5b6a3e8c",
        "Message": json!({ "Records": records }).to_string()
    })
}

#[tokio::test]
async fn test_liveness() {
    let app = setup_test_app();

    let response = app.server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

#[tokio::test]
async fn test_readiness_follows_marker_store() {
    let app = setup_test_app();

    let ready = app.server.get("/health/ready").await;
    ready.assert_status_ok();
    assert_eq!(ready.json::<Value>()["marker_store"], "ready");

    app.markers.set_unavailable(true);
    let not_ready = app.server.get("/health/ready").await;
    not_ready.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(not_ready.json::<Value>()["status"], "not_ready");
}

#[tokio::test]
async fn test_delivery_success_then_duplicate_skipped() {
    let app = setup_test_app();
    app.storage
        .insert(BUCKET, "resize/photo.png", png(128, 96), "image/png");
    let payload = json!({ "Records": [s3_record("resize/photo.png")] });

    let first = app.server.post("/v1/deliveries").json(&payload).await;
    first.assert_status_ok();
    let body = first.json::<Value>();
    assert_eq!(body["outcomes"][0]["status"], "Success");
    assert_eq!(body["outcomes"][0]["output"]["key"], "processed/resize/photo.png");

    let second = app.server.post("/v1/deliveries").json(&payload).await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["outcomes"][0]["status"], "Skipped");
    assert_eq!(app.storage.put_count(BUCKET, "processed/resize/photo.png"), 1);
}

#[tokio::test]
async fn test_permanent_failure_is_acknowledged() {
    let app = setup_test_app();
    let payload = json!({ "Records": [s3_record("unknown/file.jpg")] });

    let response = app.server.post("/v1/deliveries").json(&payload).await;

    response.assert_status_ok();
    let outcome = &response.json::<Value>()["outcomes"][0];
    assert_eq!(outcome["status"], "Failed");
    assert_eq!(outcome["kind"], "UnroutableKey");
    assert_eq!(outcome["retryable"], false);
    assert_eq!(app.storage.total_puts(), 0);
}

#[tokio::test]
async fn test_garbage_body_is_malformed_not_http_error() {
    let app = setup_test_app();

    let response = app.server.post("/v1/deliveries").text("not json at all").await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>()["outcomes"][0]["kind"],
        "MalformedEnvelope"
    );
}

#[tokio::test]
async fn test_transient_failure_requests_redelivery() {
    let app = setup_test_app();
    app.storage
        .insert(BUCKET, "greyscale/cat.png", png(8, 8), "image/png");
    app.markers.set_unavailable(true);
    let payload = json!({ "Records": [s3_record("greyscale/cat.png")] });

    let response = app.server.post("/v1/deliveries").json(&payload).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.header("retry-after"), "2");
    let outcome = &response.json::<Value>()["outcomes"][0];
    assert_eq!(outcome["kind"], "StoreUnavailable");
    assert_eq!(outcome["retryable"], true);
}

#[tokio::test]
async fn test_batched_notification_yields_outcome_per_record() {
    let app = setup_test_app();
    app.storage
        .insert(BUCKET, "greyscale/a.png", png(8, 8), "image/png");
    app.storage
        .insert(BUCKET, "exif/b.png", png(8, 8), "image/png");
    let payload = sns_wrapped(vec![
        s3_record("greyscale/a.png"),
        s3_record("exif/b.png"),
        s3_record("elsewhere/c.png"),
    ]);

    let response = app.server.post("/v1/deliveries").json(&payload).await;

    response.assert_status_ok();
    let body = response.json::<Value>();
    let outcomes = body["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0]["status"], "Success");
    assert_eq!(outcomes[1]["output"]["key"], "processed/exif/b.png.json");
    assert_eq!(outcomes[2]["kind"], "UnroutableKey");
}

#[tokio::test]
async fn test_oversized_payload_rejected() {
    let app = setup_test_app_with_limit(256);
    let payload = sns_wrapped(vec![s3_record("resize/x.png"); 8]);

    let response = app.server.post("/v1/deliveries").json(&payload).await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.markers.is_empty().await);
}

#[tokio::test]
async fn test_record_inspection_and_reset() {
    let app = setup_test_app();
    app.storage
        .insert(BUCKET, "resize/notes.png", &b"not an image"[..], "image/png");
    let payload = json!({ "Records": [s3_record("resize/notes.png")] });

    let failed = app.server.post("/v1/deliveries").json(&payload).await;
    failed.assert_status_ok();
    let outcome = failed.json::<Value>()["outcomes"][0].clone();
    assert_eq!(outcome["kind"], "UnsupportedFormat");
    let processing_key = outcome["processing_key"].as_str().unwrap().to_string();

    let path = format!("/v1/records/{}", processing_key.replace('#', "%23"));
    let record = app.server.get(&path).await;
    record.assert_status_ok();
    assert_eq!(record.json::<Value>()["status"], "failed");

    let by_query = app
        .server
        .get("/v1/records")
        .add_query_param("processing_key", &processing_key)
        .await;
    by_query.assert_status_ok();
    assert_eq!(by_query.json::<Value>()["processing_key"], processing_key.as_str());

    let reset = app
        .server
        .post("/v1/records/reset")
        .json(&json!({ "processing_key": processing_key }))
        .await;
    reset.assert_status_ok();
    assert_eq!(reset.json::<Value>()["status"], "pending");
    assert_eq!(reset.json::<Value>()["attempt_count"], 0);

    // Pending is not Failed
    let again = app
        .server
        .post("/v1/records/reset")
        .json(&json!({ "processing_key": processing_key }))
        .await;
    again.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_record() {
    let app = setup_test_app();

    app.server
        .get("/v1/records/uploads/resize/none.png%23abc")
        .await
        .assert_status_not_found();

    app.server
        .get("/v1/records")
        .add_query_param("processing_key", "uploads/resize/none.png#abc")
        .await
        .assert_status_not_found();

    // Without a query parameter there is nothing to look up
    app.server
        .get("/v1/records")
        .await
        .assert_status_bad_request();

    app.server
        .post("/v1/records/reset")
        .json(&json!({ "processing_key": "uploads/resize/none.png#abc" }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_reset_rejects_invalid_body() {
    let app = setup_test_app();

    app.server
        .post("/v1/records/reset")
        .json(&json!({ "key": "x" }))
        .await
        .assert_status_bad_request();
}
