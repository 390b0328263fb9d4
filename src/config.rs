//! Runtime configuration.
//!
//! The binary reads these values from command-line flags with environment
//! fallbacks (see `main.rs`); library users build the structs directly.

use std::net::SocketAddr;
use std::time::Duration;

/// Address the control plane HTTP server binds to.
pub const BIND_ENV_VAR: &str = "CALLS_BIND";
/// Base URL of the control plane used by proxies and workers.
pub const CONTROL_PLANE_URL_ENV_VAR: &str = "CALLS_CONTROL_PLANE_URL";
/// Identifier of a worker process.
pub const WORKER_ID_ENV_VAR: &str = "CALLS_WORKER_ID";
/// Worker poll interval in milliseconds.
pub const POLL_INTERVAL_ENV_VAR: &str = "CALLS_POLL_INTERVAL_MS";
/// Number of worker slots per process.
pub const WORKER_CONCURRENCY_ENV_VAR: &str = "CALLS_WORKER_CONCURRENCY";

pub const DEFAULT_BIND: &str = "127.0.0.1:5001";
pub const DEFAULT_CONTROL_PLANE_URL: &str = "http://127.0.0.1:5001";

/// How often a proxy polls a call it is waiting on.
pub const DEFAULT_PROXY_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How long an idle worker sleeps between polls.
pub const DEFAULT_WORKER_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 5001)),
        }
    }
}

/// Transport settings of `HttpControlPlane`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    /// Total attempts per request, including the first.
    pub attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            attempts: 3,
            initial_backoff: Duration::from_millis(150),
            max_backoff: Duration::from_millis(1200),
        }
    }
}

/// Generates a worker id of the form `worker-1a2b3c4d`.
pub fn generate_worker_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("worker-{}", &id[..8])
}
