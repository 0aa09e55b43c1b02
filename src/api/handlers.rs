// Request handlers for the webhook API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::error::ApiResult;
use super::AppState;
use crate::metrics;
use crate::webhooks::{DeliveryLogEntry, SubscriptionRequest, SubscriptionSummary};

/// Body of `POST /api/events`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    pub event_type: Option<String>,
    pub payload: Option<Value>,
}

pub async fn register_webhook(
    State(state): State<AppState>,
    body: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let subscription = state.service.register(request).await?;
    Ok((StatusCode::CREATED, Json(subscription.summary())))
}

pub async fn list_webhooks(State(state): State<AppState>) -> Json<Vec<SubscriptionSummary>> {
    Json(state.service.list().await)
}

pub async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<SubscriptionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let updated = state.service.update(&id, request).await?;
    Ok((StatusCode::CREATED, Json(updated)))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ingest_event(
    State(state): State<AppState>,
    body: Result<Json<EventRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(event) = body?;
    let event_type = event.event_type.unwrap_or_default();
    let payload = event.payload.unwrap_or(Value::Null);

    state.service.dispatch(&event_type, payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"message": "Event processing started"})),
    ))
}

pub async fn delivery_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<DeliveryLogEntry>> {
    Json(state.service.deliveries(&id).await)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "subscriptions": state.service.subscription_count().await,
        "activeChains": state.service.active_chains().await,
    }))
}

pub async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}
