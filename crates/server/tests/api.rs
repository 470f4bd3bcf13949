use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use db::DBService;
use enact_server::{AppState, routes};
use serde_json::{Value, json};
use services::services::config::{Config, NotifierKind};

const GOOD_TOKEN: &str = "good-token";

fn authorized(headers: &HeaderMap) -> Result<(), StatusCode> {
    let expected = format!("Bearer {GOOD_TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn ok_if_authorized(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!({})))
}

async fn tips(headers: HeaderMap, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!([
        {"title": "Look around", "description": format!("Tip for {}", body["type"].as_str().unwrap_or_default())}
    ])))
}

/// Bodies of `POST /endpoint/session/end` seen by the fake backend.
type EndedSessions = Arc<Mutex<Vec<Value>>>;

async fn start_usage(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!({"session_id": 7})))
}

async fn end_usage(
    State(ended): State<EndedSessions>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    ended.lock().unwrap().push(body);
    Ok(Json(json!({})))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Control API backed by a fake ENACT backend; returns the API base URL and
/// the usage sessions the backend saw ended.
async fn spawn_agent() -> (String, EndedSessions) {
    let ended = EndedSessions::default();
    let backend = Router::new()
        .route("/api/auth/verify", post(ok_if_authorized))
        .route("/api/auth/logout", post(ok_if_authorized))
        .route("/endpoint", post(ok_if_authorized))
        .route("/endpoint/session/start", post(start_usage))
        .route("/endpoint/session/end", post(end_usage))
        .route("/api/tips/get-tips", post(tips))
        .with_state(ended.clone());
    let backend_url = spawn(backend).await;

    let mut config = Config::default();
    config.backend.base_url = backend_url;
    config.notifications.notifier = NotifierKind::Log;

    let db = DBService::new_in_memory().await.unwrap();
    let state = AppState::build(config, db).await.unwrap();
    (spawn(routes::router(state)).await, ended)
}

#[tokio::test]
async fn test_status_starts_signed_out() {
    let (base, _) = spawn_agent().await;
    let body: Value = reqwest::get(format!("{base}/api/session/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["state"], "idle");
    assert_eq!(body["data"]["authenticated"], false);
}

#[tokio::test]
async fn test_login_gates_backend_routes() {
    let (base, ended) = spawn_agent().await;
    let http = reqwest::Client::new();

    let res = http
        .get(format!("{base}/api/tips/Grocery"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = http
        .post(format!("{base}/api/session/login"))
        .json(&json!({"token": "stale"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);

    let res = http
        .post(format!("{base}/api/session/login"))
        .json(&json!({"token": GOOD_TOKEN}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["authenticated"], true);
    assert_eq!(body["data"]["usage_session_id"], "7");

    let body: Value = http
        .get(format!("{base}/api/tips/Grocery"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0]["description"], "Tip for Grocery");

    let res = http
        .post(format!("{base}/api/session/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(*ended.lock().unwrap(), vec![json!({"session_id": "7"})]);

    let res = http
        .post(format!("{base}/api/session/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_location_feed_routes() {
    let (base, _) = spawn_agent().await;
    let http = reqwest::Client::new();

    let res = http
        .post(format!("{base}/api/location"))
        .json(&json!({"latitude": 123.0, "longitude": 0.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = http
        .post(format!("{base}/api/location"))
        .json(&json!({"latitude": 29.65, "longitude": -82.32, "accuracy": 12.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = http
        .get(format!("{base}/api/location"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["position"]["latitude"], 29.65);
    assert_eq!(body["data"]["accuracy"], 12.0);

    http.delete(format!("{base}/api/location"))
        .send()
        .await
        .unwrap();
    let body: Value = http
        .get(format!("{base}/api/location"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_remote_message_relayed() {
    let (base, _) = spawn_agent().await;
    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/push/message"))
        .json(&json!({"id": "m-1", "message": "Park: Point out the birds"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["data"]["notificationId"], "m-1");
    assert_eq!(body["data"]["locationType"], "Park");
    assert_eq!(body["data"]["title"], "New Notification");
}

#[tokio::test]
async fn test_push_token_requires_session() {
    let (base, _) = spawn_agent().await;
    let res = reqwest::Client::new()
        .post(format!("{base}/api/push/token"))
        .json(&json!({"token": "fcm-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reminder_settings_round_trip() {
    let (base, _) = spawn_agent().await;
    let http = reqwest::Client::new();

    let body: Value = http
        .get(format!("{base}/api/reminders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["settings"]["general_enabled"], false);
    assert_eq!(body["data"]["upcoming"], json!([]));

    let res = http
        .put(format!("{base}/api/reminders"))
        .json(&json!({
            "general_enabled": false,
            "specific_reminders": [
                {"id": "r1", "day": "Friday", "hour": 25, "minute": 0}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = http
        .put(format!("{base}/api/reminders"))
        .json(&json!({
            "general_enabled": true,
            "specific_reminders": [
                {"id": "r1", "day": "Friday", "hour": 18, "minute": 30}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = http
        .get(format!("{base}/api/reminders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["settings"]["specific_reminders"][0]["enabled"], true);
    let kinds: Vec<&str> = body["data"]["upcoming"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&"general_reminder"));
    assert!(kinds.contains(&"specific_reminder"));
}
