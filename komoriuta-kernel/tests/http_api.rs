//! Tests de l'API REST via `tower::ServiceExt::oneshot`, sans socket.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use komoriuta_devkit::{MachineBuilder, TestHarness, TEST_API_KEY};
use komoriuta_kernel::http::build_router;
use komoriuta_kernel::{HeartbeatState, PowerState};
use serde_json::{json, Value};
use time::Duration;
use tower::ServiceExt;

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", TEST_API_KEY);
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

#[tokio::test]
async fn test_missing_or_wrong_key_is_rejected() {
    let h = TestHarness::new();
    let app = build_router(h.app_state());

    let no_key = Request::builder().uri("/machines").body(Body::empty()).unwrap();
    assert_eq!(send(&app, no_key).await.0, StatusCode::UNAUTHORIZED);

    let bad_key = Request::builder()
        .uri("/machines")
        .header("x-api-key", "nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, bad_key).await.0, StatusCode::UNAUTHORIZED);

    // /health reste public
    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    assert_eq!(send(&app, health).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_unconfigured_key_denies_everything_but_health() {
    let h = TestHarness::new();
    let app = build_router(h.app_state_with_key(None));

    let (status, _) = send(&app, request(Method::GET, "/machines", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    assert_eq!(send(&app, health).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_machine_crud() {
    let h = TestHarness::new();
    let app = build_router(h.app_state());

    let (status, created) = send(
        &app,
        request(
            Method::POST,
            "/machines",
            Some(json!({ "name": "nas", "mac_address": "02:00:00:00:00:05", "heartbeat_interval_seconds": 20 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "nas");
    assert_eq!(created["power_state"], "OFF");
    assert_eq!(created["heartbeat_state"], "NONE");
    assert_eq!(created["current_status"], "Applying");
    let id = created["id"].as_u64().unwrap();

    let (status, list) = send(&app, request(Method::GET, "/machines", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let (status, patched) = send(
        &app,
        request(Method::PATCH, &format!("/machines/{id}"), Some(json!({ "name": "nas-2" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["name"], "nas-2");
    assert_eq!(patched["heartbeat_interval_seconds"], 20);

    let (status, _) = send(&app, request(Method::DELETE, &format!("/machines/{id}"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request(Method::GET, &format!("/machines/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_registration_is_bad_request() {
    let h = TestHarness::new();
    let app = build_router(h.app_state());

    let (status, _) = send(
        &app,
        request(Method::POST, "/machines", Some(json!({ "name": "x", "mac_address": "not-a-mac" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            "/machines",
            Some(json!({ "name": "x", "mac_address": "02:00:00:00:00:01", "heartbeat_interval_seconds": 0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_power_commands() {
    let h = TestHarness::new();
    let m = h.add(MachineBuilder::new("ws").mac("aa:bb:cc:dd:ee:01")).unwrap();
    let app = build_router(h.app_state());

    let (status, body) = send(
        &app,
        request(Method::POST, &format!("/machines/{}/power", m.id), Some(json!({ "state": "ON" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["power_state"], "ON");
    assert_eq!(h.waker.sent(), vec!["aa:bb:cc:dd:ee:01".to_string()]);

    let (status, body) = send(
        &app,
        request(Method::POST, &format!("/machines/{}/power", m.id), Some(json!({ "state": "OFF" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["power_state"], "OFF");
    assert_eq!(h.waker.sent().len(), 1);

    let (status, _) = send(
        &app,
        request(Method::POST, "/machines/999/power", Some(json!({ "state": "OFF" }))),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wake_failure_is_bad_gateway() {
    let h = TestHarness::new();
    let m = h.add(MachineBuilder::new("ws")).unwrap();
    h.waker.set_failing(true);
    let app = build_router(h.app_state());

    let (status, _) = send(
        &app,
        request(Method::POST, &format!("/machines/{}/power", m.id), Some(json!({ "state": "ON" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(h.machine(m.id).unwrap().power_state, PowerState::Off);
}

#[tokio::test]
async fn test_heartbeat_ack_and_status() {
    let h = TestHarness::new();
    let m = h.add(MachineBuilder::new("agent")).unwrap();
    let app = build_router(h.app_state());

    let (status, ack) = send(
        &app,
        request(
            Method::POST,
            &format!("/agents/{}/heartbeat", m.uuid),
            Some(json!({ "state": "LAUNCHED" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({ "machine_id": m.id, "power_state": "OFF" }));

    // statut calculé à la lecture, avant tout tick
    let (_, view) = send(&app, request(Method::GET, &format!("/machines/{}", m.id), None)).await;
    assert_eq!(view["previous_heartbeat_state"], "NONE");
    assert_eq!(view["heartbeat_state"], "LAUNCHED");
    assert_eq!(view["current_status"], "SyncedON");

    h.tick().unwrap();
    let (status, ack) = send(
        &app,
        request(Method::POST, &format!("/agents/{}/heartbeat", m.uuid), Some(json!({ "state": "ON" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["power_state"], "ON");

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            &format!("/agents/{}/heartbeat", uuid::Uuid::new_v4()),
            Some(json!({ "state": "ON" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_system_health_reports_last_tick() {
    let h = TestHarness::new();
    let now = h.now();
    h.add(MachineBuilder::new("a").heartbeat(HeartbeatState::Launched, now)).unwrap();
    h.add(MachineBuilder::new("b").mac("02:00:00:00:00:02")).unwrap();
    h.advance(Duration::seconds(1));
    h.tick().unwrap();

    let app = build_router(h.app_state());
    let (status, health) = send(&app, request(Method::GET, "/system/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["machines_tracked"], 2);
    assert_eq!(health["mqtt_status"], "disabled");
    assert_eq!(health["last_tick_failures"], 0);
    assert_eq!(health["status_counts"]["Applying"], 1);
    assert_eq!(health["status_counts"]["SyncedON"], 1);
}
