//! Worker Pool Implementation
//!
//! Spawns worker slots that continuously poll the control plane for pending calls,
//! claim one, run the registered implementation and report the outcome.
//!
//! ## Responsibilities
//! - **Polling**: listing pending calls, oldest first.
//! - **Claiming**: a `Conflict` means another worker won the race; the slot moves on.
//! - **Execution**: running the undecorated implementation inside the call's
//!   invocation context, converting every error and panic into a `failed` outcome.
//! - **Reporting**: retrying the finish report until the control plane acknowledges it.

use crate::calls::plane::ControlPlane;
use crate::calls::types::*;
use crate::config::{generate_worker_id, DEFAULT_WORKER_CONCURRENCY, DEFAULT_WORKER_POLL_INTERVAL};
use crate::context;
use crate::error::CallError;
use crate::proxy::{Dispatcher, FunctionRegistry, WaitOptions};

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base identifier. Slot `n` claims calls as `<worker_id>-<n>`.
    pub worker_id: String,
    /// Number of concurrent worker slots in this process.
    pub concurrency: usize,
    /// Sleep between polls when nothing was claimed. A slot that just executed a
    /// call polls again immediately instead of sleeping.
    pub poll_interval: Duration,
    /// How nested calls made by executing functions wait for their children.
    pub nested_wait: WaitOptions,
    pub finish_retry_initial: Duration,
    pub finish_retry_max: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: generate_worker_id(),
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            poll_interval: DEFAULT_WORKER_POLL_INTERVAL,
            nested_wait: WaitOptions::default(),
            finish_retry_initial: Duration::from_millis(200),
            finish_retry_max: Duration::from_secs(10),
        }
    }
}

/// The engine that drives call execution.
pub struct CallWorker {
    control_plane: Arc<dyn ControlPlane>,
    /// Undecorated implementations, resolved once at startup.
    registry: Arc<FunctionRegistry>,
    /// Handed to executing functions so their nested calls go through the control plane.
    dispatcher: Dispatcher,
    config: WorkerConfig,
}

impl CallWorker {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        registry: Arc<FunctionRegistry>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::distributed(
            registry.clone(),
            control_plane.clone(),
            config.nested_wait.clone(),
        );

        Arc::new(Self {
            control_plane,
            registry,
            dispatcher,
            config,
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    pub fn slot_id(&self, slot: usize) -> String {
        format!("{}-{}", self.config.worker_id, slot)
    }

    /// Spawns the worker slots and returns immediately.
    /// Each slot runs independently until `shutdown` is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        let slots = self.config.concurrency.max(1);
        tracing::info!(
            "Starting {} worker slots as {} ({} functions: {:?})",
            slots,
            self.config.worker_id,
            self.registry.function_count(),
            self.registry.function_names()
        );

        (0..slots)
            .map(|slot| {
                let worker = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    worker.worker_loop(slot, shutdown).await;
                })
            })
            .collect()
    }

    /// Runs all slots until `shutdown` is cancelled and every slot has exited.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        for handle in self.spawn(shutdown) {
            if let Err(e) = handle.await {
                tracing::error!("Worker slot terminated abnormally: {}", e);
            }
        }
        tracing::info!("Worker stopped");
    }

    /// The main loop for a single worker slot.
    async fn worker_loop(&self, slot: usize, shutdown: CancellationToken) {
        let slot_id = self.slot_id(slot);
        tracing::info!("Worker {} started", slot_id);

        while !shutdown.is_cancelled() {
            let executed = match self.poll_once(&slot_id).await {
                Ok(executed) => executed.is_some(),
                Err(e) => {
                    tracing::warn!("Worker {} poll failed: {}", slot_id, e);
                    false
                }
            };

            // Refresh the list immediately after work; sleep only when idle.
            if !executed {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        tracing::info!("Worker {} shutting down", slot_id);
    }

    /// Lists pending calls, claims the first one available and executes it.
    ///
    /// Returns the id of the executed call, or `None` when nothing could be claimed.
    pub async fn poll_once(&self, worker_id: &str) -> Result<Option<CallId>, CallError> {
        let calls = self.control_plane.list_pending().await?;

        if calls.is_empty() {
            return Ok(None);
        }
        tracing::trace!("Worker {} found {} pending calls", worker_id, calls.len());

        for candidate in calls {
            match self.control_plane.claim_call(candidate.id, worker_id).await {
                Ok(call) => {
                    tracing::info!(
                        "Worker {} claimed call {} ({})",
                        worker_id,
                        call.id,
                        call.function_name
                    );
                    let id = call.id;
                    let outcome = self.execute_call(call).await;
                    self.report_outcome(id, outcome).await;
                    return Ok(Some(id));
                }
                Err(CallError::Conflict(_)) | Err(CallError::NotFound(_)) => {
                    tracing::trace!("Call {} already claimed by another worker", candidate.id);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// Runs the implementation of a claimed call and converts its result into an outcome.
    pub async fn execute_call(&self, call: Call) -> Outcome {
        let Some(function) = self.registry.get(&call.function_name) else {
            tracing::error!("Call {} names unknown function {}", call.id, call.function_name);
            return Outcome::Failed(format!("unknown function: {}", call.function_name));
        };

        let dispatcher = self.dispatcher.clone();
        let arguments = call.arguments;
        // Calling the function inside the async block keeps synchronous panics catchable too.
        let execution = AssertUnwindSafe(async move { function(dispatcher, arguments).await })
            .catch_unwind();

        match context::scope(call.id, execution).await {
            Ok(Ok(value)) => Outcome::Completed(value),
            Ok(Err(e)) => {
                tracing::warn!("Call {} ({}) raised: {:#}", call.id, call.function_name, e);
                Outcome::Failed(format_failure(&e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Call {} ({}) panicked: {}", call.id, call.function_name, message);
                Outcome::Failed(format!("panic: {}", message))
            }
        }
    }

    /// Reports an outcome, retrying transport failures until acknowledged.
    ///
    /// A lost finish leaves the call `running` forever, so transient errors are never
    /// given up on. Rejections (conflict, not found, validation) are final.
    async fn report_outcome(&self, id: CallId, outcome: Outcome) {
        let mut delay = self.config.finish_retry_initial;

        loop {
            match self.control_plane.finish_call(id, outcome.clone()).await {
                Ok(call) => {
                    tracing::info!("Finished call {} with status: {}", id, call.status);
                    return;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("Finish report for call {} failed, retrying: {}", id, e);
                    let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                    tokio::time::sleep(delay + jitter).await;
                    delay = (delay * 2).min(self.config.finish_retry_max);
                }
                Err(e) => {
                    tracing::error!("Finish report for call {} rejected: {}", id, e);
                    return;
                }
            }
        }
    }
}

/// Message plus the full cause chain (and backtrace, when captured).
///
/// anyhow's `Debug` output already starts with the top-level message.
fn format_failure(error: &anyhow::Error) -> String {
    if error.to_string().trim().is_empty() {
        format!("error without message{:?}", error)
    } else {
        format!("{:?}", error)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
