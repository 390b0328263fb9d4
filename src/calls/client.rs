//! HTTP Control Plane Client
//!
//! `ControlPlane` implementation that talks to a remote control plane over the
//! JSON API in `protocol`. Used by proxies and workers that run in a different
//! process than the store.
//!
//! ## Retries
//! Transport failures are retried with exponential backoff and jitter. Requests
//! that are safe to repeat (reads, claims, finishes) are retried on any send
//! error; `create` is retried only when the connection was never established,
//! so a lost response cannot produce a duplicate call. Claims carry a nonce, so
//! a retried claim whose first attempt already won is acknowledged rather than
//! reported as a conflict.

use super::plane::ControlPlane;
use super::protocol::*;
use super::types::*;
use crate::config::ClientConfig;
use crate::error::CallError;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Retry any send error.
    Idempotent,
    /// Retry only errors raised before the request reached the server.
    ConnectOnly,
}

pub struct HttpControlPlane {
    base_url: String,
    http_client: reqwest::Client,
    config: ClientConfig,
}

impl HttpControlPlane {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(base_url, ClientConfig::default())
    }

    pub fn with_config(base_url: &str, config: ClientConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            config,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_calls(&self, filter: CallFilter) -> Result<Vec<Call>, CallError> {
        let mut url = format!("{}{}?status={}", self.base_url, ENDPOINT_CALLS, filter.status);
        if let Some(limit) = filter.limit {
            url.push_str(&format!("&limit={}", limit));
        }

        let response = self
            .send_with_retry(|| self.http_client.get(&url), RetryPolicy::Idempotent)
            .await?;
        let listing: ListCallsResponse = decode(response).await?;
        Ok(listing.calls)
    }

    pub async fn list_children(&self, id: CallId) -> Result<Vec<Call>, CallError> {
        let url = format!("{}{}/children", self.base_url, call_path(id));
        let response = self
            .send_with_retry(|| self.http_client.get(&url), RetryPolicy::Idempotent)
            .await?;
        let listing: ListCallsResponse = decode(response).await?;
        Ok(listing.calls)
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, CallError> {
        let url = format!("{}{}", self.base_url, ENDPOINT_CALL_STATS);
        let response = self
            .send_with_retry(|| self.http_client.get(&url), RetryPolicy::Idempotent)
            .await?;
        decode(response).await
    }

    // --- HTTP Helpers with Backoff ---

    async fn send_with_retry<F>(
        &self,
        build: F,
        policy: RetryPolicy,
    ) -> Result<reqwest::Response, CallError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let attempts = self.config.attempts.max(1);
        let mut delay_ms = self.config.initial_backoff.as_millis() as u64;
        let max_delay_ms = self.config.max_backoff.as_millis() as u64;

        for attempt in 0..attempts {
            let response = build().timeout(self.config.request_timeout).send().await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let retryable = match policy {
                        RetryPolicy::Idempotent => true,
                        RetryPolicy::ConnectOnly => e.is_connect(),
                    };
                    if !retryable || attempt + 1 == attempts {
                        return Err(CallError::Transport(e.to_string()));
                    }
                    tracing::debug!(
                        "Request to control plane failed (attempt {}/{}): {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    // Jittered exponential backoff
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(max_delay_ms);
                }
            }
        }

        Err(CallError::Transport("Retry attempts exhausted".to_string()))
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn create_call(
        &self,
        caller_id: Option<CallId>,
        function_name: &str,
        arguments: Arguments,
    ) -> Result<CallId, CallError> {
        let url = format!("{}{}", self.base_url, ENDPOINT_CALL);
        let payload = CreateCallRequest {
            caller_id,
            function_name: function_name.to_string(),
            arguments: serde_json::to_value(&arguments)?,
        };

        let response = self
            .send_with_retry(
                || self.http_client.post(&url).json(&payload),
                RetryPolicy::ConnectOnly,
            )
            .await?;
        let created: CreateCallResponse = decode(response).await?;
        Ok(created.invocation_id)
    }

    async fn list_pending(&self) -> Result<Vec<Call>, CallError> {
        self.list_calls(CallFilter::pending()).await
    }

    async fn get_call(&self, id: CallId) -> Result<Call, CallError> {
        let url = format!("{}{}", self.base_url, call_path(id));
        let response = self
            .send_with_retry(|| self.http_client.get(&url), RetryPolicy::Idempotent)
            .await?;
        decode(response).await
    }

    async fn claim_call(&self, id: CallId, worker_id: &str) -> Result<Call, CallError> {
        let url = format!("{}{}/start", self.base_url, call_path(id));
        // Every retry of this request carries the same token, so a retry whose
        // first attempt already won is acknowledged by the server.
        let payload = StartCallRequest {
            worker_id: worker_id.to_string(),
            claim_token: Some(uuid::Uuid::new_v4().to_string()),
        };

        let response = self
            .send_with_retry(
                || self.http_client.post(&url).json(&payload),
                RetryPolicy::Idempotent,
            )
            .await?;
        decode(response).await
    }

    async fn finish_call(&self, id: CallId, outcome: Outcome) -> Result<Call, CallError> {
        let url = format!("{}{}/finish", self.base_url, call_path(id));
        let payload = FinishCallRequest::from(outcome);

        let response = self
            .send_with_retry(
                || self.http_client.post(&url).json(&payload),
                RetryPolicy::Idempotent,
            )
            .await?;
        decode(response).await
    }
}

/// Decodes a successful body, or maps an error body back into `CallError`.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CallError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| CallError::Transport(format!("invalid response body: {}", e)));
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => format!("control plane returned {}", status),
    };

    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            CallError::Validation(message)
        }
        StatusCode::NOT_FOUND => CallError::NotFound(message),
        StatusCode::CONFLICT => CallError::Conflict(message),
        _ => CallError::Transport(message),
    })
}
