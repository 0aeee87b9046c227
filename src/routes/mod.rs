pub mod boards;

use crate::db::{self, PoolManager};
use crate::error::AppError;
use axum::{Json, Router, extract::State, routing::get};
use serde_json::json;
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<PoolManager>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/db", get(health_db))
        .merge(boards::routes())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health_db(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    db::ping(&state.db).await?;

    Ok(Json(json!({
        "status": "ok",
        "database": "reachable"
    })))
}
