//! Error taxonomy shared by the control plane, proxies and workers.
//!
//! The variants mirror the failure classes a caller can observe on the wire:
//! validation failures (400), unknown ids (404), state-transition races (409),
//! and the client-side failures of waiting on a remote call.

use crate::calls::types::{CallId, CallStatus};

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Malformed request or a payload that does not match the requested transition.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown call id, or unknown function name at execution time.
    #[error("not found: {0}")]
    NotFound(String),

    /// The call is not in the status required for the requested transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An argument or result could not be encoded as a portable value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The wrapped function failed on a worker. Only its textual description survives.
    #[error("call {invocation_id} failed remotely: {message}")]
    RemoteExecution {
        invocation_id: CallId,
        message: String,
    },

    /// The wrapped function failed while running in-process (standalone mode).
    #[error("{function} failed: {source:#}")]
    LocalExecution {
        function: String,
        #[source]
        source: anyhow::Error,
    },

    /// The control plane could not be reached after exhausting retries.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for call {invocation_id}")]
    Timeout { invocation_id: CallId },

    #[error("wait for call {invocation_id} was cancelled")]
    Cancelled { invocation_id: CallId },
}

impl CallError {
    pub fn call_not_found(id: CallId) -> Self {
        CallError::NotFound(format!("call {} does not exist", id))
    }

    pub fn wrong_status(id: CallId, expected: CallStatus, actual: CallStatus) -> Self {
        CallError::Conflict(format!(
            "call {} is {} (expected {})",
            id, actual, expected
        ))
    }

    /// Short machine-readable tag used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::Validation(_) => "validation",
            CallError::NotFound(_) => "not_found",
            CallError::Conflict(_) => "conflict",
            CallError::Serialization(_) => "serialization",
            CallError::RemoteExecution { .. } => "remote_execution",
            CallError::LocalExecution { .. } => "local_execution",
            CallError::Transport(_) => "transport",
            CallError::Timeout { .. } => "timeout",
            CallError::Cancelled { .. } => "cancelled",
        }
    }

    /// Message without the variant prefix, as carried in HTTP error bodies.
    pub fn detail(&self) -> String {
        match self {
            CallError::Validation(msg)
            | CallError::NotFound(msg)
            | CallError::Conflict(msg)
            | CallError::Serialization(msg)
            | CallError::Transport(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transport(_))
    }
}

impl From<serde_json::Error> for CallError {
    fn from(e: serde_json::Error) -> Self {
        CallError::Serialization(e.to_string())
    }
}
