use super::registry::FunctionRegistry;
use super::waiter::{CompletionWaiter, PollingWaiter, WaitOptions};
use crate::calls::plane::ControlPlane;
use crate::calls::types::{Arguments, CallStatus};
use crate::context;
use crate::error::CallError;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Entry point for invoking distributable functions by name.
///
/// Cheap to clone. Every registered function receives one as its first argument
/// and uses it for nested calls. Without a control plane the dispatcher runs
/// functions in-process as plain calls (standalone mode).
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<FunctionRegistry>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    waiter: Arc<dyn CompletionWaiter>,
}

impl Dispatcher {
    /// Dispatcher that executes every call locally, without call records.
    pub fn standalone(registry: Arc<FunctionRegistry>) -> Self {
        Self {
            registry,
            control_plane: None,
            waiter: Arc::new(PollingWaiter::new(WaitOptions::default())),
        }
    }

    /// Dispatcher that turns every invocation into a call on `control_plane`.
    pub fn distributed(
        registry: Arc<FunctionRegistry>,
        control_plane: Arc<dyn ControlPlane>,
        options: WaitOptions,
    ) -> Self {
        Self {
            registry,
            control_plane: Some(control_plane),
            waiter: Arc::new(PollingWaiter::new(options)),
        }
    }

    /// Replaces the completion waiter (e.g. with a push-based implementation).
    pub fn with_waiter(mut self, waiter: Arc<dyn CompletionWaiter>) -> Self {
        self.waiter = waiter;
        self
    }

    pub fn is_distributed(&self) -> bool {
        self.control_plane.is_some()
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn proxy(&self, function_name: &str) -> InvocationProxy {
        InvocationProxy {
            function_name: function_name.to_string(),
            dispatcher: self.clone(),
        }
    }

    pub async fn invoke(&self, function_name: &str, arguments: Arguments) -> Result<Value, CallError> {
        self.proxy(function_name).invoke(arguments).await
    }

    /// Like [`invoke`](Self::invoke), decoding the result into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        function_name: &str,
        arguments: Arguments,
    ) -> Result<T, CallError> {
        let value = self.invoke(function_name, arguments).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Client-side wrapper that makes a remote call look like a local async function call.
pub struct InvocationProxy {
    function_name: String,
    dispatcher: Dispatcher,
}

impl InvocationProxy {
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub async fn invoke(&self, arguments: Arguments) -> Result<Value, CallError> {
        match &self.dispatcher.control_plane {
            Some(control_plane) => self.invoke_remote(control_plane.as_ref(), arguments).await,
            None => self.invoke_local(arguments).await,
        }
    }

    /// Standalone fallback: a plain in-process call. No record, no context change.
    async fn invoke_local(&self, arguments: Arguments) -> Result<Value, CallError> {
        let function = self
            .dispatcher
            .registry
            .get(&self.function_name)
            .ok_or_else(|| {
                CallError::NotFound(format!("unknown function: {}", self.function_name))
            })?;

        tracing::debug!("Running {} in-process", self.function_name);
        function(self.dispatcher.clone(), arguments)
            .await
            .map_err(|source| CallError::LocalExecution {
                function: self.function_name.clone(),
                source,
            })
    }

    async fn invoke_remote(
        &self,
        control_plane: &dyn ControlPlane,
        arguments: Arguments,
    ) -> Result<Value, CallError> {
        let caller_id = context::current();
        let invocation_id = control_plane
            .create_call(caller_id, &self.function_name, arguments)
            .await?;

        tracing::debug!(
            "Waiting on call {} ({}) caller={:?}",
            invocation_id,
            self.function_name,
            caller_id
        );

        // While the call is outstanding, nested calls from this task attribute to it.
        let call = context::scope(
            invocation_id,
            self.dispatcher.waiter.wait(control_plane, invocation_id),
        )
        .await?;

        match call.status {
            CallStatus::Completed => Ok(call.result.unwrap_or(Value::Null)),
            CallStatus::Failed => Err(CallError::RemoteExecution {
                invocation_id,
                message: call.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            other => Err(CallError::Conflict(format!(
                "call {} returned from wait while {}",
                invocation_id, other
            ))),
        }
    }
}
