//! REST handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::error::Error;
use crate::health::aggregate;
use crate::http::request::{parse_item_id, request_id, CreateItem};
use crate::http::server::AppState;

pub async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, Error> {
    let Json(body) = body.map_err(|rejection| Error::InvalidArgument(rejection.body_text()))?;
    let request = CreateItem::from_json(&body)?;

    tracing::debug!(
        request_id = %request_id(&headers),
        name = %request.name,
        id = ?request.id,
        "Creating item"
    );
    let item = state.gateway.create_item(request.name, request.id).await?;
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

pub async fn list_items(State(state): State<AppState>) -> Result<Response, Error> {
    let items = state.gateway.list_items().await?;
    Ok(Json(items).into_response())
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, Error> {
    let id = parse_item_id(&raw_id)?;
    let item = state.gateway.get_item(id).await?;
    Ok(Json(item).into_response())
}

/// Aggregated health. Runs in its own task so a fault while aggregating
/// becomes a 503 body instead of a dropped connection.
pub async fn health(State(state): State<AppState>) -> Response {
    let task = tokio::spawn(async move { aggregate(&state.gateway, &state.backend).await });

    match task.await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health aggregation failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn reset_breaker(State(state): State<AppState>, headers: HeaderMap) -> Response {
    state.gateway.reset_breaker();
    tracing::info!(request_id = %request_id(&headers), "Circuit breaker reset via API");

    let breaker = state.gateway.breaker();
    Json(json!({
        "status": "success",
        "breaker_state": breaker.state(),
        "fail_count": breaker.consecutive_failures(),
    }))
    .into_response()
}
