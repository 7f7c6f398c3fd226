//! HTTP handlers: translate REST calls into addressed bus requests.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde_json::Value;

use crate::bus::BusFailure;
use crate::operation::Operation;
use crate::response::json_pretty;
use crate::state::ApiState;

/// `GET /api/:entity`: list every record of the entity named in the path.
pub async fn get_all(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
) -> Result<Response, BusFailure> {
    let reply = state
        .bus
        .request(&Operation::GetAll.address(&entity), Value::Null)
        .await?;
    Ok(json_pretty(StatusCode::OK, &reply))
}

/// `POST /api/search`: parametrized search; the body's `type` names the entity.
pub async fn search(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, BusFailure> {
    request_with_body(&state, Operation::Search, payload).await
}

/// `POST /api/`: create a record of the entity named by the body's `type`.
pub async fn add(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, BusFailure> {
    request_with_body(&state, Operation::Add, payload).await
}

/// `PUT /api/`: update the record identified by the body's `recid`.
pub async fn update(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, BusFailure> {
    request_with_body(&state, Operation::Update, payload).await
}

/// `DELETE /api/`: delete the record identified by the body's `recid`.
pub async fn delete(
    State(state): State<ApiState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, BusFailure> {
    request_with_body(&state, Operation::Delete, payload).await
}

async fn request_with_body(
    state: &ApiState,
    op: Operation,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, BusFailure> {
    let Json(body) = payload.map_err(|rejection| BusFailure::new(rejection.body_text()))?;
    let Some(entity) = body.get("type").and_then(Value::as_str) else {
        return Err(BusFailure::new("missing entity type in request body"));
    };
    let address = op.address(entity);
    let reply = state.bus.request(&address, body).await?;
    Ok(json_pretty(StatusCode::OK, &reply))
}
