//! LINE notifier and HTTP broker against a local capture server.

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tickwatch_core::OrderPayload;
use tickwatch_dispatch::{
    Broker, DispatchError, HttpBroker, HttpBrokerConfig, LineNotifier, LineNotifyConfig, Notifier,
};

#[derive(Clone, Default)]
struct Captured {
    messages: Arc<Mutex<Vec<(Option<String>, String)>>>,
    orders: Arc<Mutex<Vec<serde_json::Value>>>,
}

async fn notify(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> StatusCode {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if auth.as_deref() != Some("Bearer good-token") {
        return StatusCode::UNAUTHORIZED;
    }
    let message = form.get("message").cloned().unwrap_or_default();
    captured.messages.lock().push((auth, message));
    StatusCode::OK
}

async fn orders(State(captured): State<Captured>, Json(body): Json<serde_json::Value>) -> StatusCode {
    captured.orders.lock().push(body);
    StatusCode::CREATED
}

async fn start_server() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/api/notify", post(notify))
        .route("/orders", post(orders))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), captured)
}

#[tokio::test]
async fn test_line_notifier_posts_form_with_bearer() {
    let (base, captured) = start_server().await;
    let notifier = LineNotifier::new(LineNotifyConfig {
        url: format!("{base}/api/notify"),
        token: "good-token".to_string(),
        timeout_ms: 2_000,
    })
    .unwrap();

    notifier.send("\n<<TSMC>>\nhello".to_string()).await.unwrap();

    let messages = captured.messages.lock().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1, "\n<<TSMC>>\nhello");
}

#[tokio::test]
async fn test_line_notifier_reports_rejection() {
    let (base, _captured) = start_server().await;
    let notifier = LineNotifier::new(LineNotifyConfig {
        url: format!("{base}/api/notify"),
        token: "bad-token".to_string(),
        timeout_ms: 2_000,
    })
    .unwrap();

    match notifier.send("x".to_string()).await {
        Err(DispatchError::Rejected { status, .. }) => assert_eq!(status, 401),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_line_notifier_without_token_is_not_configured() {
    let notifier = LineNotifier::new(LineNotifyConfig::default()).unwrap();
    assert!(matches!(
        notifier.send("x".to_string()).await,
        Err(DispatchError::NotConfigured(_))
    ));
}

#[tokio::test]
async fn test_http_broker_fire_and_forget() {
    let (base, captured) = start_server().await;
    let broker = HttpBroker::new(HttpBrokerConfig {
        url: format!("{base}/orders"),
        timeout_ms: 2_000,
    })
    .unwrap();

    let payload = serde_json::json!({"symbol": "2330", "side": "buy", "qty": 1000});
    broker.submit(OrderPayload(payload.clone()));

    for _ in 0..200 {
        if !captured.orders.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(captured.orders.lock().clone(), vec![payload]);
}
