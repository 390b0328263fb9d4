//! Call Store & Control Plane Module
//!
//! Owns the lifecycle of every call: the record that turns one function
//! invocation into an independently schedulable, trackable unit of work.
//!
//! ## Lifecycle
//! 1. **Create**: a proxy inserts a `Pending` call, attributed to its caller (if any).
//! 2. **Claim**: a worker atomically moves it to `Running`. Exactly one claim wins.
//! 3. **Finish**: the same worker atomically moves it to `Completed` or `Failed`.
//!
//! No lease or heartbeat is kept: a call whose worker dies stays `Running`.
//!
//! ## Submodules
//! - **`types`**: `Call`, `CallStatus`, `Arguments`, `Outcome` and the state machine.
//! - **`store`**: the in-process store with atomic conditional transitions.
//! - **`plane`**: the `ControlPlane` trait shared by proxies and workers.
//! - **`protocol`**: HTTP request/response shapes and endpoints.
//! - **`handlers`**: axum handlers serving the store.
//! - **`client`**: `HttpControlPlane`, the remote implementation of `ControlPlane`.

pub mod client;
pub mod handlers;
pub mod plane;
pub mod protocol;
pub mod store;
pub mod types;
