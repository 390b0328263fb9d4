use super::protocol::*;
use super::store::CallStore;
use super::types::*;
use crate::error::CallError;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, Query};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router, http::StatusCode};
use std::sync::Arc;

/// Builds the control plane router over a shared store.
pub fn router(store: Arc<CallStore>) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_health))
        .route(ENDPOINT_CALLS, get(handle_list_calls))
        .route(ENDPOINT_CALL_STATS, get(handle_call_stats))
        .route(ENDPOINT_CALL, post(handle_create_call))
        .route("/api/call/:id", get(handle_get_call))
        .route("/api/call/:id/start", post(handle_start_call))
        .route("/api/call/:id/finish", post(handle_finish_call))
        .route("/api/call/:id/children", get(handle_list_children))
        .layer(Extension(store))
}

impl IntoResponse for CallError {
    fn into_response(self) -> Response {
        let status = match &self {
            CallError::Validation(_) | CallError::Serialization(_) => StatusCode::BAD_REQUEST,
            CallError::NotFound(_) => StatusCode::NOT_FOUND,
            CallError::Conflict(_) => StatusCode::CONFLICT,
            CallError::Transport(_) => StatusCode::BAD_GATEWAY,
            CallError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            error: self.detail(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, CallError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| CallError::Validation(rejection.body_text()))
}

fn call_id(path: Result<Path<u64>, PathRejection>) -> Result<CallId, CallError> {
    path.map(|Path(id)| CallId(id))
        .map_err(|rejection| CallError::Validation(rejection.body_text()))
}

pub async fn handle_health(Extension(store): Extension<Arc<CallStore>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        calls: store.len(),
    })
}

pub async fn handle_list_calls(
    Extension(store): Extension<Arc<CallStore>>,
    Query(params): Query<ListCallsParams>,
) -> Result<Json<ListCallsResponse>, CallError> {
    let status = match params.status.as_deref() {
        Some(raw) => raw.parse::<CallStatus>()?,
        None => CallStatus::Pending,
    };
    let filter = CallFilter {
        status,
        limit: params.limit,
    };

    let calls = store.list_calls(filter);
    tracing::trace!("Listing {} {} calls", calls.len(), status);
    Ok(Json(ListCallsResponse { calls }))
}

pub async fn handle_call_stats(Extension(store): Extension<Arc<CallStore>>) -> Json<StatusCounts> {
    Json(store.status_counts())
}

pub async fn handle_create_call(
    Extension(store): Extension<Arc<CallStore>>,
    payload: Result<Json<CreateCallRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateCallResponse>), CallError> {
    let req = body(payload)?;
    let arguments = Arguments::from_value(req.arguments)?;

    let invocation_id = store.create_call(req.caller_id, &req.function_name, arguments)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateCallResponse {
            invocation_id,
            status: CallStatus::Pending,
        }),
    ))
}

pub async fn handle_get_call(
    Extension(store): Extension<Arc<CallStore>>,
    path: Result<Path<u64>, PathRejection>,
) -> Result<Json<Call>, CallError> {
    let id = call_id(path)?;
    let call = store.get_call(id)?;
    tracing::trace!("Call status query: {} -> {}", id, call.status);
    Ok(Json(call))
}

pub async fn handle_start_call(
    Extension(store): Extension<Arc<CallStore>>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<StartCallRequest>, JsonRejection>,
) -> Result<Json<Call>, CallError> {
    let id = call_id(path)?;
    let req = body(payload)?;
    let call = store.claim_call_with_token(id, &req.worker_id, req.claim_token.as_deref())?;
    Ok(Json(call))
}

pub async fn handle_finish_call(
    Extension(store): Extension<Arc<CallStore>>,
    path: Result<Path<u64>, PathRejection>,
    payload: Result<Json<FinishCallRequest>, JsonRejection>,
) -> Result<Json<Call>, CallError> {
    let id = call_id(path)?;
    let req = body(payload)?;
    let outcome = Outcome::from_parts(req.status, req.result, req.error)?;
    let call = store.finish_call(id, outcome)?;
    Ok(Json(call))
}

pub async fn handle_list_children(
    Extension(store): Extension<Arc<CallStore>>,
    path: Result<Path<u64>, PathRejection>,
) -> Result<Json<ListCallsResponse>, CallError> {
    let calls = store.list_children(call_id(path)?)?;
    Ok(Json(ListCallsResponse { calls }))
}
