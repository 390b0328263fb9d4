//! Invocation Context
//!
//! Tracks which call is the active caller of the current async task, so a call made
//! from inside another call records the right `parent_id`.
//!
//! The context is a stack of call ids stored in a tokio task-local, never in a
//! process-wide variable: a worker executing call A and an unrelated flow starting
//! call B in the same process each see only their own stack. Tasks created with
//! `tokio::spawn` start with an empty context.
//!
//! Entering a call is only possible through [`scope`], which installs a copy of the
//! current stack with the id pushed for the lifetime of one future. The previous
//! stack is visible again as soon as that future completes, fails, panics or is
//! dropped.

mod stack;

pub use stack::InvocationStack;

use crate::calls::types::CallId;
use std::future::Future;

tokio::task_local! {
    static INVOCATION_STACK: InvocationStack;
}

/// The innermost active call of this task, or `None` for a root invocation.
pub fn current() -> Option<CallId> {
    INVOCATION_STACK
        .try_with(|stack| stack.current())
        .ok()
        .flatten()
}

/// A copy of this task's stack (empty outside any scope).
pub fn snapshot() -> InvocationStack {
    INVOCATION_STACK
        .try_with(|stack| stack.clone())
        .unwrap_or_default()
}

/// Runs `future` with `id` pushed on top of the current stack.
pub async fn scope<F>(id: CallId, future: F) -> F::Output
where
    F: Future,
{
    let mut stack = snapshot();
    stack.push(id);
    INVOCATION_STACK.scope(stack, future).await
}

/// Synchronous counterpart of [`scope`] for non-async code paths.
pub fn sync_scope<F, R>(id: CallId, f: F) -> R
where
    F: FnOnce() -> R,
{
    let mut stack = snapshot();
    stack.push(id);
    INVOCATION_STACK.sync_scope(stack, f)
}
