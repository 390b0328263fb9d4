use crate::error::CallError;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Identifier of a call, assigned by the store from a monotonic sequence.
///
/// The id doubles as the invocation id handed back to proxies, and ordering by
/// id is the creation order used for first-come fairness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a call.
///
/// Legal transitions are `Pending -> Running -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Created by a proxy, waiting for a worker.
    Pending,
    /// Claimed by exactly one worker.
    Running,
    Completed,
    Failed,
}

impl CallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Running => "running",
            CallStatus::Completed => "completed",
            CallStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }

    pub fn can_transition_to(self, next: CallStatus) -> bool {
        matches!(
            (self, next),
            (CallStatus::Pending, CallStatus::Running)
                | (CallStatus::Running, CallStatus::Completed)
                | (CallStatus::Running, CallStatus::Failed)
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(CallStatus::Pending),
            "running" => Ok(CallStatus::Running),
            "completed" => Ok(CallStatus::Completed),
            "failed" => Ok(CallStatus::Failed),
            other => Err(CallError::Validation(format!("invalid status: {}", other))),
        }
    }
}

/// Arguments of a call: positional values plus keyword values.
///
/// Every element is a portable JSON value, so arguments can cross process
/// boundaries unchanged. On the wire this is always `{ "args": [...], "kwargs": {...} }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Arguments {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument, serializing it to a portable value.
    pub fn arg<T: Serialize>(mut self, value: T) -> Result<Self, CallError> {
        self.args.push(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Adds a keyword argument, serializing it to a portable value.
    pub fn kwarg<T: Serialize>(mut self, name: &str, value: T) -> Result<Self, CallError> {
        self.kwargs
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Decodes the positional argument at `index`.
    pub fn get_arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, CallError> {
        let value = self.args.get(index).ok_or_else(|| {
            CallError::Validation(format!(
                "missing positional argument {} (got {})",
                index,
                self.args.len()
            ))
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Decodes the keyword argument `name`.
    pub fn get_kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, CallError> {
        let value = self
            .kwargs
            .get(name)
            .ok_or_else(|| CallError::Validation(format!("missing keyword argument '{}'", name)))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Validates an untyped wire value as `{ args: [...], kwargs: {...} }`.
    pub fn from_value(value: Value) -> Result<Self, CallError> {
        if !value.is_object() {
            return Err(CallError::Validation(
                "arguments must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| CallError::Validation(format!("malformed arguments: {}", e)))
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Terminal outcome reported by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Value),
    Failed(String),
}

impl Outcome {
    /// Builds an outcome from the loose wire shape `{status, result?, error?}`.
    ///
    /// The payload must match the requested status: `completed` carries a result
    /// and no error, `failed` carries a non-empty error and no result.
    pub fn from_parts(
        status: CallStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Self, CallError> {
        match (status, result, error) {
            (CallStatus::Completed, Some(result), None) => Ok(Outcome::Completed(result)),
            (CallStatus::Completed, None, _) => Err(CallError::Validation(
                "result required for completed status".to_string(),
            )),
            (CallStatus::Failed, None, Some(error)) if !error.trim().is_empty() => {
                Ok(Outcome::Failed(error))
            }
            (CallStatus::Failed, None, _) => Err(CallError::Validation(
                "non-empty error required for failed status".to_string(),
            )),
            (CallStatus::Completed, Some(_), Some(_)) | (CallStatus::Failed, Some(_), _) => Err(
                CallError::Validation("result and error are mutually exclusive".to_string()),
            ),
            (other, _, _) => Err(CallError::Validation(format!(
                "status must be one of: completed, failed (got {})",
                other
            ))),
        }
    }

    pub fn status(&self) -> CallStatus {
        match self {
            Outcome::Completed(_) => CallStatus::Completed,
            Outcome::Failed(_) => CallStatus::Failed,
        }
    }
}

/// A call record: one invocation tracked from creation to a terminal state.
///
/// Records are never deleted; the table is an append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Call {
    #[serde(rename = "invocation_id")]
    pub id: CallId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CallId>,
    pub function_name: String,
    #[serde(default)]
    pub arguments: Arguments,
    pub status: CallStatus,
    /// Present iff completed. A `null` return value is stored as `Some(Value::Null)`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_value"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Nonce of the start request that won the claim. Server-side only.
    #[serde(skip)]
    pub(crate) claim_token: Option<String>,
}

impl Call {
    pub fn new_pending(
        id: CallId,
        parent_id: Option<CallId>,
        function_name: String,
        arguments: Arguments,
    ) -> Self {
        Self {
            id,
            parent_id,
            function_name,
            arguments,
            status: CallStatus::Pending,
            result: None,
            error: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            claim_token: None,
        }
    }

    /// `pending -> running`. Leaves the record untouched on failure.
    pub fn claim(&mut self, worker_id: &str) -> Result<(), CallError> {
        if worker_id.trim().is_empty() {
            return Err(CallError::Validation("worker_id must not be empty".to_string()));
        }
        if !self.status.can_transition_to(CallStatus::Running) {
            return Err(CallError::wrong_status(
                self.id,
                CallStatus::Pending,
                self.status,
            ));
        }

        self.status = CallStatus::Running;
        self.worker_id = Some(worker_id.to_string());
        self.started_at = Some(stamp_after(self.created_at));
        Ok(())
    }

    /// `running -> completed | failed`. Leaves the record untouched on failure.
    pub fn finish(&mut self, outcome: Outcome) -> Result<(), CallError> {
        if !self.status.can_transition_to(outcome.status()) {
            return Err(CallError::wrong_status(
                self.id,
                CallStatus::Running,
                self.status,
            ));
        }

        let previous = self.started_at.unwrap_or(self.created_at);
        self.status = outcome.status();
        match outcome {
            Outcome::Completed(value) => self.result = Some(value),
            Outcome::Failed(error) => self.error = Some(error),
        }
        self.completed_at = Some(stamp_after(previous));
        Ok(())
    }
}

/// Current wall-clock time, clamped so timestamps of one record never go backwards.
fn stamp_after(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

/// Deserializes a field that is present (even as `null`) into `Some`.
///
/// Combined with `#[serde(default)]`, a missing field stays `None`.
pub(crate) fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Number of calls per status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }
}

/// Selection used by `list_calls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallFilter {
    pub status: CallStatus,
    pub limit: Option<usize>,
}

impl CallFilter {
    /// Every pending call, oldest first.
    pub fn pending() -> Self {
        Self {
            status: CallStatus::Pending,
            limit: None,
        }
    }
}
