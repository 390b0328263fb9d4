//! Invocation Proxy Module
//!
//! Client side of the engine: turns a call of a named function into a call record
//! on the control plane and waits for its outcome, so the caller sees an ordinary
//! async function returning a value or an error.
//!
//! ## Invocation flow
//! 1. Arguments are already portable values (`Arguments::arg` / `kwarg`).
//! 2. The current caller is read from the task's invocation context.
//! 3. `create_call` records the call as `Pending`.
//! 4. The wait runs inside `context::scope(id, ..)`, so nested calls attribute to `id`.
//! 5. A `CompletionWaiter` (polling by default) resolves once the call is terminal.
//! 6. `completed` yields the result; `failed` yields `RemoteExecution` with the error text.
//!
//! Without a control plane, the proxy runs the registered implementation directly.
//!
//! ## Submodules
//! - **`registry`**: name -> undecorated implementation.
//! - **`dispatcher`**: `Dispatcher` and `InvocationProxy`.
//! - **`waiter`**: `CompletionWaiter`, `PollingWaiter`, `WaitOptions`.

pub mod dispatcher;
pub mod registry;
pub mod waiter;

pub use dispatcher::{Dispatcher, InvocationProxy};
pub use registry::{FunctionFn, FunctionFuture, FunctionRegistry};
pub use waiter::{CompletionWaiter, PollingWaiter, WaitOptions};
