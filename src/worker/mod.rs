//! Worker Module
//!
//! Pull-based execution of calls. Any number of worker processes may poll the same
//! control plane; they never coordinate with each other, only through the atomic
//! `claim_call` transition.
//!
//! A slot that executes a function making nested calls stays busy until those
//! children finish, so the total number of slots across all workers must exceed the
//! deepest nesting level of the workload.

#[allow(clippy::module_inception)]
pub mod worker;

pub use worker::{CallWorker, WorkerConfig};

#[cfg(test)]
mod tests;
