//! Function Registry
//!
//! Maps function names to their undecorated implementations. Workers execute
//! these implementations directly; going through an `InvocationProxy` from a
//! worker would create a new call for the same function and loop forever.

use super::dispatcher::Dispatcher;
use crate::calls::types::Arguments;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Boxed future returned by a registered function.
pub type FunctionFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Type-erased implementation of a distributable function.
///
/// The `Dispatcher` argument is how the function makes nested calls; it routes them
/// through the control plane when one is configured.
pub type FunctionFn = Arc<dyn Fn(Dispatcher, Arguments) -> FunctionFuture + Send + Sync>;

pub struct FunctionRegistry {
    functions: DashMap<String, FunctionFn>,
}

impl FunctionRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `function` under `name`, replacing any previous registration.
    pub fn register<F, Fut>(&self, name: &str, function: F)
    where
        F: Fn(Dispatcher, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        // Box::pin erases the concrete future type so different async functions share one map.
        let function_fn: FunctionFn = Arc::new(move |dispatcher: Dispatcher, arguments: Arguments| {
            Box::pin(function(dispatcher, arguments)) as FunctionFuture
        });

        if self
            .functions
            .insert(name.to_string(), function_fn)
            .is_some()
        {
            tracing::warn!("Replaced existing function registration: {}", name);
        } else {
            tracing::info!("Registered function: {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<FunctionFn> {
        self.functions.get(name).map(|entry| entry.value().clone())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self {
            functions: DashMap::new(),
        }
    }
}
