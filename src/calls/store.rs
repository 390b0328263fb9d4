//! In-Process Call Store
//!
//! The durable state-machine table behind the control plane. Every call lives in a
//! sharded concurrent map keyed by `CallId`; ids come from an atomic sequence so
//! creation order is total within one store.
//!
//! ## Atomicity
//! `claim_call` and `finish_call` are single conditional updates executed while
//! holding the shard write lock of the record (`DashMap::get_mut`). The status
//! check and the mutation happen under the same lock, which makes each
//! transition linearizable per id: of any number of concurrent claims on the same
//! call exactly one observes `Pending`, all others observe `Running` and get a
//! `Conflict` without touching the record.

use super::types::*;
use crate::error::CallError;

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct CallStore {
    /// Structure: `CallId -> Call`. Entries are never removed.
    calls: DashMap<CallId, Call>,
    /// Last id handed out. Ids start at 1.
    sequence: AtomicU64,
}

impl CallStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts a new `Pending` call and returns its id.
    ///
    /// The caller, if any, must already exist. Since a parent is always created
    /// before its children it has a strictly smaller id, so `parent_id` edges can
    /// never form a cycle.
    pub fn create_call(
        &self,
        caller_id: Option<CallId>,
        function_name: &str,
        arguments: Arguments,
    ) -> Result<CallId, CallError> {
        let function_name = function_name.trim();
        if function_name.is_empty() {
            return Err(CallError::Validation(
                "function_name must not be empty".to_string(),
            ));
        }

        if let Some(parent) = caller_id {
            if !self.calls.contains_key(&parent) {
                return Err(CallError::Validation(format!(
                    "caller {} does not exist",
                    parent
                )));
            }
        }

        let id = CallId(self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        let call = Call::new_pending(id, caller_id, function_name.to_string(), arguments);
        self.calls.insert(id, call);

        tracing::info!(
            "Created call {} ({}) parent={:?}",
            id,
            function_name,
            caller_id
        );
        Ok(id)
    }

    pub fn get_call(&self, id: CallId) -> Result<Call, CallError> {
        self.calls
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CallError::call_not_found(id))
    }

    /// Snapshot of all pending calls, oldest first.
    pub fn list_pending(&self) -> Vec<Call> {
        self.list_calls(CallFilter::pending())
    }

    /// Snapshot of calls in one status, ascending id, optionally truncated.
    pub fn list_calls(&self, filter: CallFilter) -> Vec<Call> {
        let mut calls: Vec<Call> = self
            .calls
            .iter()
            .filter(|entry| entry.value().status == filter.status)
            .map(|entry| entry.value().clone())
            .collect();

        calls.sort_by_key(|call| call.id);
        if let Some(limit) = filter.limit {
            calls.truncate(limit);
        }
        calls
    }

    /// Direct children of a call, ascending id.
    pub fn list_children(&self, id: CallId) -> Result<Vec<Call>, CallError> {
        if !self.calls.contains_key(&id) {
            return Err(CallError::call_not_found(id));
        }

        let mut children: Vec<Call> = self
            .calls
            .iter()
            .filter(|entry| entry.value().parent_id == Some(id))
            .map(|entry| entry.value().clone())
            .collect();
        children.sort_by_key(|call| call.id);
        Ok(children)
    }

    /// Atomically moves a call from `Pending` to `Running` on behalf of `worker_id`.
    pub fn claim_call(&self, id: CallId, worker_id: &str) -> Result<Call, CallError> {
        self.claim_call_with_token(id, worker_id, None)
    }

    /// Like [`claim_call`](Self::claim_call), remembering `claim_token` on success.
    ///
    /// A repeat of the winning request (same token, same worker) is acknowledged
    /// with the running record instead of `Conflict`. Any other claim, including a
    /// second one by the same worker id with a different token, is a `Conflict`.
    pub fn claim_call_with_token(
        &self,
        id: CallId,
        worker_id: &str,
        claim_token: Option<&str>,
    ) -> Result<Call, CallError> {
        let mut entry = self
            .calls
            .get_mut(&id)
            .ok_or_else(|| CallError::call_not_found(id))?;

        if let Some(token) = claim_token {
            let repeated = entry.status == CallStatus::Running
                && entry.claim_token.as_deref() == Some(token)
                && entry.worker_id.as_deref() == Some(worker_id);
            if repeated {
                tracing::debug!("Repeated claim of call {} by {} acknowledged", id, worker_id);
                return Ok(entry.value().clone());
            }
        }

        entry.claim(worker_id)?;
        entry.claim_token = claim_token.map(str::to_string);

        tracing::debug!("Call {} claimed by {}", id, worker_id);
        Ok(entry.value().clone())
    }

    /// Atomically moves a call from `Running` to its terminal status.
    ///
    /// A second finish of the same call is rejected with `Conflict` and leaves the
    /// stored result, error and timestamps unchanged.
    pub fn finish_call(&self, id: CallId, outcome: Outcome) -> Result<Call, CallError> {
        let mut entry = self
            .calls
            .get_mut(&id)
            .ok_or_else(|| CallError::call_not_found(id))?;

        entry.finish(outcome)?;

        match entry.status {
            CallStatus::Completed => tracing::info!("Call {} completed", id),
            _ => tracing::warn!(
                "Call {} failed: {}",
                id,
                entry.error.as_deref().unwrap_or_default()
            ),
        }
        Ok(entry.value().clone())
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.calls.iter() {
            match entry.value().status {
                CallStatus::Pending => counts.pending += 1,
                CallStatus::Running => counts.running += 1,
                CallStatus::Completed => counts.completed += 1,
                CallStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl Default for CallStore {
    fn default() -> Self {
        Self {
            calls: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }
}
