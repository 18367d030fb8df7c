use crate::alerts::{AlertRule, AlertStore, NewAlertRule};
use crate::app::DashboardHandle;
use crate::error::DashboardError;
use crate::observability;
use crate::presentation::{DashboardSnapshot, Summary};
use crate::query::Filter;
use axum::{
    extract::{Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, put},
    Router,
};
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub dashboard: DashboardHandle,
    pub alerts: Arc<AlertStore>,
}

impl AppState {
    pub fn new(dashboard: DashboardHandle) -> Self {
        Self {
            dashboard,
            alerts: Arc::new(AlertStore::new()),
        }
    }
}

/// Maps domain errors onto HTTP responses.
pub struct ApiError(DashboardError);

impl From<DashboardError> for ApiError {
    fn from(e: DashboardError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DashboardError::InvalidAlert(_) => StatusCode::BAD_REQUEST,
            DashboardError::Closed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct SnapshotResponse {
    #[serde(flatten)]
    snapshot: DashboardSnapshot,
    summary: Summary,
    stale: bool,
}

#[derive(Debug, Deserialize)]
struct LiveRequest {
    live: bool,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "logstream-dashboard",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn snapshot(State(state): State<AppState>) -> Result<Json<SnapshotResponse>, ApiError> {
    let snapshot = state.dashboard.snapshot().await?;
    Ok(Json(SnapshotResponse {
        summary: snapshot.summary(),
        stale: snapshot.is_stale(),
        snapshot,
    }))
}

async fn set_filter(
    State(state): State<AppState>,
    Json(filter): Json<Filter>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.set_filter(filter)?;
    Ok(StatusCode::ACCEPTED)
}

async fn set_live(
    State(state): State<AppState>,
    Json(request): Json<LiveRequest>,
) -> Result<StatusCode, ApiError> {
    state.dashboard.set_live(request.live)?;
    Ok(StatusCode::ACCEPTED)
}

async fn list_alerts(State(state): State<AppState>) -> Json<Vec<AlertRule>> {
    Json(state.alerts.list())
}

async fn create_alert(
    State(state): State<AppState>,
    Json(rule): Json<NewAlertRule>,
) -> Result<(StatusCode, Json<AlertRule>), ApiError> {
    let rule = state.alerts.add(rule)?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn delete_alert(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.alerts.remove(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn metrics() -> Response {
    match observability::render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Create the HTTP router with all routes.
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/snapshot", get(snapshot))
        .route("/api/filter", put(set_filter))
        .route("/api/live", put(set_live))
        .route("/api/alerts", get(list_alerts).post(create_alert))
        .route("/api/alerts/:id", delete(delete_alert))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port.
pub async fn start_server(state: AppState, port: u16) -> Result<(), hyper::Error> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "HTTP server listening");
    println!("🚀 Dashboard API running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("📋 Snapshot:     http://localhost:{port}/api/snapshot");

    Server::bind(&addr).serve(app.into_make_service()).await
}
