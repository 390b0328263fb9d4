//! Completion waiting.
//!
//! Proxies learn that a remote call finished through a `CompletionWaiter`. The
//! default waiter polls `get_call`; a long-poll or push based waiter can replace it
//! without touching the call state machine.

use crate::calls::plane::ControlPlane;
use crate::calls::types::{Call, CallId};
use crate::config::DEFAULT_PROXY_POLL_INTERVAL;
use crate::error::CallError;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    /// Upper bound on the whole wait. `None` waits indefinitely.
    pub max_wait: Option<Duration>,
    /// Aborts the wait when cancelled. The remote call itself keeps going.
    pub cancellation: Option<CancellationToken>,
}

impl WaitOptions {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_PROXY_POLL_INTERVAL,
            max_wait: None,
            cancellation: None,
        }
    }
}

#[async_trait]
pub trait CompletionWaiter: Send + Sync {
    /// Resolves once call `id` reached a terminal status and returns its record.
    async fn wait(&self, control_plane: &dyn ControlPlane, id: CallId) -> Result<Call, CallError>;
}

/// Polls the control plane at a fixed interval.
pub struct PollingWaiter {
    options: WaitOptions,
}

impl PollingWaiter {
    pub fn new(options: WaitOptions) -> Self {
        Self { options }
    }

    async fn poll_until_terminal(
        &self,
        control_plane: &dyn ControlPlane,
        id: CallId,
    ) -> Result<Call, CallError> {
        loop {
            match control_plane.get_call(id).await {
                Ok(call) if call.status.is_terminal() => return Ok(call),
                Ok(call) => {
                    tracing::trace!("Call {} still {}", id, call.status);
                }
                // The call is still out there; keep polling once the control plane is back.
                Err(e) if e.is_transient() => {
                    tracing::warn!("Polling call {} failed: {}", id, e);
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[async_trait]
impl CompletionWaiter for PollingWaiter {
    async fn wait(&self, control_plane: &dyn ControlPlane, id: CallId) -> Result<Call, CallError> {
        let bounded = async {
            match self.options.max_wait {
                Some(max_wait) => {
                    tokio::time::timeout(max_wait, self.poll_until_terminal(control_plane, id))
                        .await
                        .map_err(|_| CallError::Timeout { invocation_id: id })
                        .and_then(|outcome| outcome)
                }
                None => self.poll_until_terminal(control_plane, id).await,
            }
        };

        match &self.options.cancellation {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(CallError::Cancelled { invocation_id: id }),
                outcome = bounded => outcome,
            },
            None => bounded.await,
        }
    }
}
