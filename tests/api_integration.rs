#![cfg(feature = "api")]

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::util::ServiceExt;
use ups_imitator::api::{router, serve};

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request"),
        None => builder.body(Body::empty()).expect("valid request"),
    };
    let resp = app.clone().oneshot(req).await.expect("router is infallible");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn operator_session_round_trip() {
    let (imitator, _sink) = common::recording_imitator(&common::default_config());
    let app = router(Arc::clone(&imitator));

    let (status, body) = send(&app, "GET", "/imitator/mode", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"mode": true}));

    let (status, body) = send(
        &app,
        "PATCH",
        "/imitator/ups/params",
        Some(json!({"input_ac_voltage": 190.0})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, body) = send(&app, "PUT", "/imitator/mode", Some(json!({"mode": false}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "OK"}));

    let (status, _) = send(
        &app,
        "PATCH",
        "/imitator/ups/params",
        Some(json!({"input_ac_voltage": 190.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "PATCH",
        "/imitator/ups/battery/0",
        Some(json!({"voltage": 11.5, "resist": 6.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "PATCH",
        "/imitator/ups/alarms",
        Some(json!({"low_battery": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, ups) = send(&app, "GET", "/imitator/ups", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ups["input_ac_voltage"], 190.0);
    assert_eq!(ups["batteries"][0]["voltage"], 11.5);
    assert_eq!(ups["batteries"][0]["resist"], 6.0);
    assert_eq!(ups["batteries"][0]["temp"], 24.0);
    assert_eq!(ups["alarms"]["low_battery"], true);
    assert_eq!(ups["alarms"]["upc_in_battery_mode"], false);
    assert_eq!(ups["battery_capacity"], 50.0);
    assert_eq!(ups["remaining_battery_capacity"], 50.0);

    // back to auto resets every override
    let (status, _) = send(&app, "PUT", "/imitator/mode", Some(json!({"mode": true}))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, ups) = send(&app, "GET", "/imitator/ups", None).await;
    assert_eq!(ups["input_ac_voltage"], 220.0);
    assert_eq!(ups["alarms"]["low_battery"], false);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (imitator, _sink) = common::recording_imitator(&common::default_config());
    imitator.set_mode(false);
    let app = router(imitator);

    let (status, body) = send(
        &app,
        "PATCH",
        "/imitator/ups/battery/4",
        Some(json!({"voltage": 12.0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().is_some_and(|e| e.contains('4')));

    let (status, _) = send(
        &app,
        "PATCH",
        "/imitator/ups/params",
        Some(json!({"soc": 0.5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "PUT", "/imitator/mode", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/imitator/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn serve_stops_on_shutdown_signal() {
    let (imitator, _sink) = common::recording_imitator(&common::default_config());

    serve(imitator, "127.0.0.1:0", async {})
        .await
        .expect("server binds and shuts down cleanly");
}

#[tokio::test]
async fn serve_binds_host_name() {
    let (imitator, _sink) = common::recording_imitator(&common::default_config());

    serve(imitator, "localhost:0", async {})
        .await
        .expect("host name resolves and binds");
}
