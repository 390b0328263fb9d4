//! Network Protocol Definitions
//!
//! Request/response shapes of the control plane HTTP API. Both the axum handlers
//! and `HttpControlPlane` use these types, so the two sides cannot drift.
//!
//! Call records themselves (`Call`) are returned as-is for `get`, `start` and
//! `finish`; they serialize with `invocation_id` as the id field.

use super::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ENDPOINT_CALLS: &str = "/api/calls";
pub const ENDPOINT_CALL_STATS: &str = "/api/calls/stats";
pub const ENDPOINT_CALL: &str = "/api/call";
pub const ENDPOINT_HEALTH: &str = "/health";

/// `POST /api/call`
///
/// `arguments` stays untyped here so a malformed shape is reported as a
/// validation error rather than a generic decoding failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCallRequest {
    #[serde(default)]
    pub caller_id: Option<CallId>,
    pub function_name: String,
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCallResponse {
    pub invocation_id: CallId,
    pub status: CallStatus,
}

/// `GET /api/calls?status=..&limit=..`
///
/// `status` defaults to `pending`; without `limit` every matching call is returned.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListCallsParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListCallsResponse {
    pub calls: Vec<Call>,
}

/// `POST /api/call/:id/start`
#[derive(Debug, Serialize, Deserialize)]
pub struct StartCallRequest {
    pub worker_id: String,
    /// Per-request nonce. Resending the same token after a lost response is
    /// acknowledged instead of rejected as a conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_token: Option<String>,
}

/// `POST /api/call/:id/finish`
///
/// `Outcome::from_parts` decides whether the payload
/// matches the requested status.
#[derive(Debug, Serialize, Deserialize)]
pub struct FinishCallRequest {
    pub status: CallStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Outcome> for FinishCallRequest {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Completed(result) => Self {
                status: CallStatus::Completed,
                result: Some(result),
                error: None,
            },
            Outcome::Failed(error) => Self {
                status: CallStatus::Failed,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub calls: usize,
}

pub fn call_path(id: CallId) -> String {
    format!("{}/{}", ENDPOINT_CALL, id)
}
