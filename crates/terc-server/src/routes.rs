//! HTTP routes
//!
//! - `GET /` redirects to the listing
//! - `GET /health` liveness
//! - `POST /admin/refresh` reloads the gold snapshot
//! - `GET /terceirizados` paginated summary listing
//! - `GET /terceirizados/:id` one record with every detail column

use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::AppError;
use crate::queries::{self, Page};
use crate::snapshot::SnapshotLoader;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub snapshot: Arc<SnapshotLoader>,
}

/// Build the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/admin/refresh", post(refresh_snapshot))
        .route("/terceirizados", get(list_terceirizados))
        .route("/terceirizados/:id", get(get_terceirizado))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(tracing_layer())
}

/// Create tracing/logging layer
pub fn tracing_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(tower_http::LatencyUnit::Micros),
        )
}

async fn root() -> Redirect {
    Redirect::temporary("/terceirizados")
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "snapshot": state.snapshot.active_path().exists(),
    }))
}

async fn refresh_snapshot(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let bytes = state.snapshot.refresh().await?;
    info!(bytes, "Refresh requested through the API");
    Ok(Json(json!({ "status": "snapshot reloaded", "bytes": bytes })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    page: Option<i64>,
    page_size: Option<i64>,
}

impl ListParams {
    /// `(page, page_size)` after defaults and bounds checks
    pub fn resolve(&self) -> Result<(u32, u32), AppError> {
        let page = self.page.unwrap_or(0);
        let page_size = self.page_size.unwrap_or(i64::from(DEFAULT_PAGE_SIZE));

        let page = u32::try_from(page)
            .map_err(|_| AppError::BadRequest(format!("page must be between 0 and {}", u32::MAX)))?;
        if page_size < 1 || page_size > i64::from(MAX_PAGE_SIZE) {
            return Err(AppError::BadRequest(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok((page, page_size as u32))
    }
}

async fn list_terceirizados(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page>, AppError> {
    let (page, page_size) = params.resolve()?;
    let db = state.snapshot.active_path().to_path_buf();

    let result =
        tokio::task::spawn_blocking(move || queries::list_page(&db, page, page_size)).await??;

    if result.data.is_empty() {
        return Err(AppError::NotFound("No records found".to_string()));
    }
    Ok(Json(result))
}

async fn get_terceirizado(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id: i64 = id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("id must be an integer: {}", id)))?;
    let db = state.snapshot.active_path().to_path_buf();

    let record = tokio::task::spawn_blocking(move || queries::find_by_id(&db, id)).await??;

    match record {
        Some(record) => Ok(Json(json!({ "data": record }))),
        None => Err(AppError::NotFound(format!("Record {} not found", id))),
    }
}
