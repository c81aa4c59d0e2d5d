//! HTTP server implementation using axum.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get};
use axum::Router;
use tickwatch_core::{ActionKind, MonitorId};
use tickwatch_engine::MonitorService;
use tickwatch_telemetry::encode_metrics;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HttpConfig;
use crate::error::ApiError;
use crate::types::{CreateAlertRequest, CreateOrderRequest, MonitorView};

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<MonitorService>,
    api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: Arc<MonitorService>, config: &HttpConfig) -> Self {
        let api_token = config
            .auth_enabled()
            .then(|| Arc::from(config.api_token.trim()));
        Self { service, api_token }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    let monitors = Router::new()
        .route("/alerts", get(list_alerts).post(create_alert))
        .route("/alerts/{id}", delete(remove_alert))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{id}", delete(remove_order))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .nest("/monitor", monitors)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bearer-token guard for `/monitor/*`.
async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(expected) = &state.api_token {
        if !bearer_matches(req.headers(), expected) {
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(serde_json::json!({ "error": ApiError::Unauthorized.to_string() })),
            )
                .into_response();
        }
    }
    next.run(req).await
}

fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == expected)
}

fn parse_id(raw: &str) -> Result<MonitorId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid monitor id: {raw}")))
}

async fn list_kind(state: &AppState, kind: ActionKind) -> Result<Json<Vec<MonitorView>>, ApiError> {
    let monitors = state.service.list_by_action_kind(kind).await?;
    Ok(Json(monitors.into_iter().map(MonitorView::from).collect()))
}

async fn list_alerts(State(state): State<AppState>) -> Result<Json<Vec<MonitorView>>, ApiError> {
    list_kind(&state, ActionKind::Alert).await
}

async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<MonitorView>>, ApiError> {
    list_kind(&state, ActionKind::Order).await
}

async fn create_alert(
    State(state): State<AppState>,
    body: Result<Json<CreateAlertRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MonitorView>), ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let monitor = state.service.create_monitor(req.into_spec()?).await?;
    Ok((StatusCode::CREATED, Json(monitor.into())))
}

async fn create_order(
    State(state): State<AppState>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MonitorView>), ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let monitor = state.service.create_monitor(req.into_spec()?).await?;
    Ok((StatusCode::CREATED, Json(monitor.into())))
}

async fn remove_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .remove_monitor(parse_id(&id)?, Some(ActionKind::Alert))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .remove_monitor(parse_id(&id)?, Some(ActionKind::Order))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let feeds = state.service.feeds();
    Json(serde_json::json!({
        "status": "ok",
        "delivering": feeds.is_delivering(),
        "open_subscriptions": feeds.open_subscriptions().await,
        "max_subscriptions": feeds.max_subscriptions(),
        "active_monitors": state.service.active_monitors(),
    }))
}

async fn metrics() -> Result<Response, ApiError> {
    let text = encode_metrics().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    )
        .into_response())
}

/// Serve the API until `shutdown` is cancelled.
pub async fn run_server(
    service: Arc<MonitorService>,
    config: HttpConfig,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = create_router(AppState::new(service, &config));
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!(addr = %config.addr(), auth = config.auth_enabled(), "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_matching() {
        let mut headers = HeaderMap::new();
        assert!(!bearer_matches(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        assert!(bearer_matches(&headers, "secret"));

        headers.insert(header::AUTHORIZATION, "Basic secret".parse().unwrap());
        assert!(!bearer_matches(&headers, "secret"));
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert!(matches!(parse_id("nope"), Err(ApiError::BadRequest(_))));
        let id = MonitorId::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }
}
