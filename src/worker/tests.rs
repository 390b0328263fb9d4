#[cfg(test)]
mod tests {
    use crate::calls::plane::ControlPlane;
    use crate::calls::store::CallStore;
    use crate::calls::types::*;
    use crate::error::CallError;
    use crate::pipeline::register_pipeline;
    use crate::proxy::{Dispatcher, FunctionRegistry, WaitOptions};
    use crate::worker::{CallWorker, WorkerConfig};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn explode(_dispatcher: Dispatcher, _arguments: Arguments) -> anyhow::Result<Value> {
        panic!("worker function exploded");
    }

    async fn failing(_dispatcher: Dispatcher, _arguments: Arguments) -> anyhow::Result<Value> {
        Err(anyhow!("disk full").context("while saving report"))
    }

    async fn nothing(_dispatcher: Dispatcher, _arguments: Arguments) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    fn test_registry() -> Arc<FunctionRegistry> {
        let registry = FunctionRegistry::new();
        register_pipeline(&registry);
        registry.register("explode", explode);
        registry.register("failing", failing);
        registry.register("nothing", nothing);
        registry
    }

    fn test_config(worker_id: &str, concurrency: usize) -> WorkerConfig {
        WorkerConfig {
            worker_id: worker_id.to_string(),
            concurrency,
            poll_interval: Duration::from_millis(10),
            nested_wait: WaitOptions::default().with_poll_interval(Duration::from_millis(10)),
            finish_retry_initial: Duration::from_millis(10),
            finish_retry_max: Duration::from_millis(50),
        }
    }

    fn worker_for(store: &Arc<CallStore>, worker_id: &str, concurrency: usize) -> Arc<CallWorker> {
        let plane: Arc<dyn ControlPlane> = store.clone();
        CallWorker::new(plane, test_registry(), test_config(worker_id, concurrency))
    }

    /// Store wrapper whose `finish_call` fails on demand.
    struct FlakyFinish {
        store: Arc<CallStore>,
        /// Finish attempts answered with a transport error before reaching the store.
        transient_failures: AtomicUsize,
        /// Answer every finish with a conflict instead.
        reject: bool,
        finish_attempts: AtomicUsize,
    }

    impl FlakyFinish {
        fn new(store: &Arc<CallStore>, transient_failures: usize, reject: bool) -> Arc<Self> {
            Arc::new(Self {
                store: store.clone(),
                transient_failures: AtomicUsize::new(transient_failures),
                reject,
                finish_attempts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ControlPlane for FlakyFinish {
        async fn create_call(
            &self,
            caller_id: Option<CallId>,
            function_name: &str,
            arguments: Arguments,
        ) -> Result<CallId, CallError> {
            self.store.create_call(caller_id, function_name, arguments)
        }

        async fn list_pending(&self) -> Result<Vec<Call>, CallError> {
            Ok(self.store.list_pending())
        }

        async fn get_call(&self, id: CallId) -> Result<Call, CallError> {
            self.store.get_call(id)
        }

        async fn claim_call(&self, id: CallId, worker_id: &str) -> Result<Call, CallError> {
            self.store.claim_call(id, worker_id)
        }

        async fn finish_call(&self, id: CallId, outcome: Outcome) -> Result<Call, CallError> {
            self.finish_attempts.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(CallError::Conflict(format!("call {} rejected", id)));
            }
            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(CallError::Transport("connection reset".to_string()));
            }
            self.store.finish_call(id, outcome)
        }
    }

    async fn wait_until_terminal(store: &CallStore, id: CallId) -> Call {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let call = store.get_call(id).unwrap();
                if call.status.is_terminal() {
                    return call;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("call never reached a terminal status")
    }

    #[test]
    fn test_slot_ids_derive_from_worker_id() {
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 2);

        assert_eq!(worker.worker_id(), "w");
        assert_eq!(worker.slot_id(0), "w-0");
        assert_eq!(worker.slot_id(1), "w-1");
    }

    #[tokio::test]
    async fn test_poll_once_with_nothing_pending() {
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);

        let executed = worker.poll_once("w-0").await.unwrap();

        assert_eq!(executed, None);
    }

    #[tokio::test]
    async fn test_poll_once_executes_oldest_pending_call() {
        // ARRANGE
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);
        let first = store
            .create_call(None, "add", Arguments::new().arg(1).unwrap().arg(2).unwrap())
            .unwrap();
        let second = store.create_call(None, "nothing", Arguments::new()).unwrap();

        // ACT
        let executed = worker.poll_once("w-0").await.unwrap();

        // ASSERT
        assert_eq!(executed, Some(first));
        let call = store.get_call(first).unwrap();
        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(call.result, Some(json!(3.0)));
        assert_eq!(call.worker_id.as_deref(), Some("w-0"));
        assert_eq!(store.get_call(second).unwrap().status, CallStatus::Pending);
    }

    #[tokio::test]
    async fn test_poll_once_skips_calls_claimed_elsewhere() {
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);
        let taken = store.create_call(None, "nothing", Arguments::new()).unwrap();
        let free = store.create_call(None, "nothing", Arguments::new()).unwrap();
        store.claim_call(taken, "someone-else").unwrap();

        let executed = worker.poll_once("w-0").await.unwrap();

        assert_eq!(executed, Some(free));
        assert_eq!(store.get_call(taken).unwrap().status, CallStatus::Running);
        assert_eq!(
            store.get_call(taken).unwrap().worker_id.as_deref(),
            Some("someone-else")
        );
    }

    #[tokio::test]
    async fn test_null_result_is_stored_as_completed() {
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);
        let id = store.create_call(None, "nothing", Arguments::new()).unwrap();

        worker.poll_once("w-0").await.unwrap();

        let call = store.get_call(id).unwrap();
        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(call.result, Some(Value::Null));
        assert_eq!(call.error, None);
    }

    #[tokio::test]
    async fn test_unknown_function_fails_the_call() {
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);
        let id = store.create_call(None, "nope", Arguments::new()).unwrap();

        worker.poll_once("w-0").await.unwrap();

        let call = store.get_call(id).unwrap();
        assert_eq!(call.status, CallStatus::Failed);
        assert_eq!(call.error.as_deref(), Some("unknown function: nope"));
        assert_eq!(call.result, None);
    }

    #[tokio::test]
    async fn test_function_error_becomes_failed_with_cause_chain() {
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);
        let id = store.create_call(None, "failing", Arguments::new()).unwrap();

        worker.poll_once("w-0").await.unwrap();

        let call = store.get_call(id).unwrap();
        assert_eq!(call.status, CallStatus::Failed);
        let error = call.error.unwrap();
        assert!(error.starts_with("while saving report"));
        assert!(error.contains("disk full"));
        assert_eq!(error.matches("while saving report").count(), 1);
    }

    #[tokio::test]
    async fn test_bad_arguments_fail_instead_of_crashing() {
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);
        let id = store
            .create_call(None, "add", Arguments::new().arg("one").unwrap())
            .unwrap();

        worker.poll_once("w-0").await.unwrap();

        let call = store.get_call(id).unwrap();
        assert_eq!(call.status, CallStatus::Failed);
        assert!(!call.error.unwrap().trim().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_function_fails_the_call_and_worker_survives() {
        // ARRANGE
        let store = CallStore::new();
        let worker = worker_for(&store, "w", 1);
        let boom = store.create_call(None, "explode", Arguments::new()).unwrap();
        let next = store.create_call(None, "nothing", Arguments::new()).unwrap();

        // ACT
        let first = worker.poll_once("w-0").await.unwrap();
        let second = worker.poll_once("w-0").await.unwrap();

        // ASSERT
        assert_eq!(first, Some(boom));
        assert_eq!(second, Some(next));
        let call = store.get_call(boom).unwrap();
        assert_eq!(call.status, CallStatus::Failed);
        assert_eq!(call.error.as_deref(), Some("panic: worker function exploded"));
        assert_eq!(store.get_call(next).unwrap().status, CallStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_workers_execute_each_call_exactly_once() {
        // ARRANGE: a function that counts how often it actually runs
        let store = CallStore::new();
        let executions = Arc::new(AtomicUsize::new(0));
        let registry = test_registry();
        let counter = executions.clone();
        registry.register("counted_add", move |_dispatcher: Dispatcher, arguments: Arguments| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let a: f64 = arguments.get_arg(0)?;
                let b: f64 = arguments.get_arg(1)?;
                Ok::<Value, anyhow::Error>(json!(a + b))
            }
        });

        let mut ids = Vec::new();
        for i in 0..40 {
            let arguments = Arguments::new().arg(i).unwrap().arg(1).unwrap();
            ids.push(store.create_call(None, "counted_add", arguments).unwrap());
        }

        // ACT: three independent worker processes with two slots each
        let shutdown = CancellationToken::new();
        let mut handles = Vec::new();
        for name in ["alpha", "beta", "gamma"] {
            let plane: Arc<dyn ControlPlane> = store.clone();
            let worker = CallWorker::new(plane, registry.clone(), test_config(name, 2));
            handles.extend(worker.spawn(shutdown.clone()));
        }
        let mut finished = Vec::new();
        for id in &ids {
            finished.push(wait_until_terminal(&store, *id).await);
        }
        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        // ASSERT
        assert_eq!(executions.load(Ordering::SeqCst), 40);
        let mut per_worker: HashMap<String, usize> = HashMap::new();
        for (i, call) in finished.iter().enumerate() {
            assert_eq!(call.status, CallStatus::Completed);
            assert_eq!(call.result, Some(json!(i as f64 + 1.0)));
            *per_worker.entry(call.worker_id.clone().unwrap()).or_default() += 1;
        }
        assert_eq!(per_worker.values().sum::<usize>(), 40);
        assert!(store.list_pending().is_empty());
        assert_eq!(store.status_counts().running, 0);
    }

    #[tokio::test]
    async fn test_finish_report_is_retried_until_acknowledged() {
        // ARRANGE: the first three finish reports are lost in transit
        let store = CallStore::new();
        let plane = FlakyFinish::new(&store, 3, false);
        let control_plane: Arc<dyn ControlPlane> = plane.clone();
        let worker = CallWorker::new(control_plane, test_registry(), test_config("w", 1));
        let id = store
            .create_call(None, "add", Arguments::new().arg(2).unwrap().arg(2).unwrap())
            .unwrap();

        // ACT
        let executed = worker.poll_once("w-0").await.unwrap();

        // ASSERT
        assert_eq!(executed, Some(id));
        assert_eq!(plane.finish_attempts.load(Ordering::SeqCst), 4);
        let call = store.get_call(id).unwrap();
        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(call.result, Some(json!(4.0)));
    }

    #[tokio::test]
    async fn test_rejected_finish_report_is_not_retried() {
        let store = CallStore::new();
        let plane = FlakyFinish::new(&store, 0, true);
        let control_plane: Arc<dyn ControlPlane> = plane.clone();
        let worker = CallWorker::new(control_plane, test_registry(), test_config("w", 1));
        let id = store.create_call(None, "nothing", Arguments::new()).unwrap();

        let executed = worker.poll_once("w-0").await.unwrap();

        assert_eq!(executed, Some(id));
        assert_eq!(plane.finish_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_call(id).unwrap().status, CallStatus::Running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pipeline_children_are_attributed_to_main() {
        // ARRANGE
        let store = CallStore::new();
        let root = store.create_call(None, "main", Arguments::new()).unwrap();
        let shutdown = CancellationToken::new();
        let handles = worker_for(&store, "w", 2).spawn(shutdown.clone());

        // ACT
        let call = wait_until_terminal(&store, root).await;
        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        // ASSERT
        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(
            call.result,
            Some(json!({"status": "success", "records_processed": 100}))
        );
        let children = store.list_children(root).unwrap();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.parent_id == Some(root)));
        assert!(children.iter().all(|c| c.status == CallStatus::Completed));
        // `main` held a slot the whole time, so its children ran on the other one.
        assert!(children
            .iter()
            .all(|c| c.worker_id != call.worker_id));
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_slots() {
        let store = CallStore::new();
        let shutdown = CancellationToken::new();
        let handles = worker_for(&store, "w", 3).spawn(shutdown.clone());

        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), async {
            for handle in handles {
                handle.await.unwrap();
            }
        })
        .await
        .expect("slots did not stop");
    }
}
