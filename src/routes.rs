//! Route tables: the REST surface plus health, readiness, and version.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers;
use crate::state::ApiState;

/// Largest accepted request body, in bytes.
const BODY_LIMIT: usize = 1024 * 1024;

/// The CRUD surface: GET /api/:entity, POST /api/search, and the
/// body-addressed POST/PUT/DELETE on /api/.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/api/:entity", get(handlers::get_all))
        .route("/api/search", post(handlers::search))
        .route(
            "/api/",
            post(handlers::add)
                .put(handlers::update)
                .delete(handlers::delete),
        )
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(
    State(state): State<ApiState>,
) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    if state.provider.acquire().await.is_err() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                database: "unavailable",
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        database: "ok",
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Service routes: GET /health, GET /ready, GET /version.
pub fn common_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
