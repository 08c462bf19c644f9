//! Request handlers for the submission and status endpoints.

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::orchestrator::SubmissionRequest;

use super::AppState;

/// `X-API-Key` gate. A no-op when `state.api_key` is unset, matching the
/// "authentication middleware (a header check)" framing this service
/// treats as an external collaborator rather than owning credential
/// storage.
pub async fn require_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_key else {
        return next.run(request).await;
    };
    let provided = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "missing or invalid X-API-Key"}))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessInvoiceRequest {
    pub image_url: String,
    pub user_id: String,
    pub message_id: String,
    pub webhook_url: String,
    #[serde(default)]
    pub pipeline_overrides: crate::model::PipelineOverrides,
    #[serde(default)]
    pub priority: crate::model::Priority,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

fn default_queue_name() -> String {
    "invoices".to_string()
}

pub async fn process_invoice(
    State(state): State<AppState>,
    Json(body): Json<ProcessInvoiceRequest>,
) -> Response {
    let request = SubmissionRequest {
        image_url: body.image_url,
        user_id: body.user_id,
        message_id: body.message_id,
        webhook_url: body.webhook_url,
        pipeline_overrides: body.pipeline_overrides,
        priority: body.priority,
        queue_name: body.queue_name,
    };

    match state.orchestrator.submit(request).await {
        Ok(job) => (
            StatusCode::OK,
            Json(json!({
                "job_id": job.job_id,
                "status": "queued",
                "estimated_time": 60,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "enqueue failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

pub async fn job_status(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    match state.orchestrator.status(&job_id).await {
        Some(view) => (StatusCode::OK, Json(view)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown job_id"}))).into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}
