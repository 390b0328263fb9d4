//! The narrow interface proxies and workers use to talk to a control plane.
//!
//! Implemented in-process by `CallStore` and remotely by `HttpControlPlane`, so the
//! same proxy and worker code runs inside one process (tests, embedded use) or
//! across machines.

use super::store::CallStore;
use super::types::*;
use crate::error::CallError;

use async_trait::async_trait;

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_call(
        &self,
        caller_id: Option<CallId>,
        function_name: &str,
        arguments: Arguments,
    ) -> Result<CallId, CallError>;

    async fn list_pending(&self) -> Result<Vec<Call>, CallError>;

    async fn get_call(&self, id: CallId) -> Result<Call, CallError>;

    async fn claim_call(&self, id: CallId, worker_id: &str) -> Result<Call, CallError>;

    async fn finish_call(&self, id: CallId, outcome: Outcome) -> Result<Call, CallError>;
}

#[async_trait]
impl ControlPlane for CallStore {
    async fn create_call(
        &self,
        caller_id: Option<CallId>,
        function_name: &str,
        arguments: Arguments,
    ) -> Result<CallId, CallError> {
        CallStore::create_call(self, caller_id, function_name, arguments)
    }

    async fn list_pending(&self) -> Result<Vec<Call>, CallError> {
        Ok(CallStore::list_pending(self))
    }

    async fn get_call(&self, id: CallId) -> Result<Call, CallError> {
        CallStore::get_call(self, id)
    }

    async fn claim_call(&self, id: CallId, worker_id: &str) -> Result<Call, CallError> {
        CallStore::claim_call(self, id, worker_id)
    }

    async fn finish_call(&self, id: CallId, outcome: Outcome) -> Result<Call, CallError> {
        CallStore::finish_call(self, id, outcome)
    }
}
