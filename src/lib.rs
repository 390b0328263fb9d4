//! Distributed Call Execution Library
//!
//! Turns ordinary async function invocations into independently schedulable,
//! trackable units of work ("calls") executed by pollable worker processes.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`calls`**: The call store and control plane. Owns the call state machine
//!   (`pending -> running -> completed | failed`), the atomic claim protocol, the
//!   HTTP API and its client.
//! - **`context`**: Per-task invocation context used to attribute nested calls
//!   to the call that made them.
//! - **`proxy`**: The client side. Wraps a function name so calling it creates a
//!   call and waits for its outcome; runs functions in-process when no control
//!   plane is configured.
//! - **`worker`**: Polls for pending calls, claims them and executes the registered
//!   implementations.
//! - **`pipeline`**: Demo functions shipped with the worker binary.

pub mod calls;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod worker;

pub use calls::types::{Arguments, Call, CallId, CallStatus, Outcome};
pub use error::CallError;
