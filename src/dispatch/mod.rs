//! Dispatch engine. Delivers prepared requests with retry and backoff,
//! and folds per-route outcomes into one aggregate.
//!
//! Per attempt:
//! - 2xx: succeeded
//! - 4xx: failed, never retried
//! - anything else (other status, transport error, timeout): retried while
//!   attempts remain, waiting `retry_delay * (n + 1)` after attempt `n`

pub mod correlation;
pub mod request;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::DispatchError;

pub use request::{DispatchRequest, build_request};
pub use transport::{ReqwestTransport, Transport};

// ── Results ─────────────────────────────────────────────────────────

/// Outcome of delivering to one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    /// Last HTTP status seen, if any response arrived.
    pub status_code: Option<u16>,
    pub message: String,
    /// Retries performed after the first attempt.
    pub retries: u32,
}

impl DispatchResult {
    /// A route that never reached the network (validation or encoding).
    pub fn rejected(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: Some(status_code),
            message: message.into(),
            retries: 0,
        }
    }
}

/// Outcome of one message across its fan-out set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub message: String,
    /// Per-route results, in route order.
    pub results: Vec<DispatchResult>,
}

/// Success if any route succeeded. Status comes from the first success,
/// else the first result.
pub fn aggregate(results: Vec<DispatchResult>) -> AggregateResult {
    let first_success = results.iter().find(|r| r.success);
    let success = first_success.is_some();
    let status_code = first_success
        .or_else(|| results.first())
        .and_then(|r| r.status_code);
    let message = if success {
        "At least one route succeeded"
    } else {
        "All routes failed"
    };

    AggregateResult {
        success,
        status_code,
        message: message.to_string(),
        results,
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

enum Attempt {
    Succeeded(u16),
    Terminal(Option<u16>, String),
    Retryable(Option<u16>, String),
}

fn classify(outcome: Result<u16, DispatchError>) -> Attempt {
    match outcome {
        Ok(status) if (200..300).contains(&status) => Attempt::Succeeded(status),
        Ok(status) if (400..500).contains(&status) => {
            Attempt::Terminal(Some(status), format!("Rejected with status {status}"))
        }
        Ok(status) => Attempt::Retryable(Some(status), format!("Endpoint returned status {status}")),
        Err(e @ DispatchError::InvalidRequest(_)) => Attempt::Terminal(None, e.to_string()),
        Err(e) => Attempt::Retryable(None, e.to_string()),
    }
}

/// Sends requests through a [`Transport`], retrying per route policy.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Deliver one request: at most `max_retries + 1` attempts.
    pub async fn send(
        &self,
        request: &DispatchRequest,
        max_retries: u32,
        retry_delay: Duration,
    ) -> DispatchResult {
        let mut attempt: u32 = 0;
        loop {
            debug!(url = %request.url, attempt = attempt + 1, "Sending webhook");

            match classify(self.transport.send(request).await) {
                Attempt::Succeeded(status) => {
                    info!(url = %request.url, status, retries = attempt, "Webhook delivered");
                    return DispatchResult {
                        success: true,
                        status_code: Some(status),
                        message: format!("Delivered with status {status}"),
                        retries: attempt,
                    };
                }
                Attempt::Terminal(status_code, message) => {
                    warn!(url = %request.url, status = ?status_code, error = %message, "Webhook rejected, not retrying");
                    return DispatchResult {
                        success: false,
                        status_code,
                        message,
                        retries: attempt,
                    };
                }
                Attempt::Retryable(status_code, message) if attempt >= max_retries => {
                    warn!(
                        url = %request.url,
                        status = ?status_code,
                        attempts = attempt + 1,
                        error = %message,
                        "Webhook delivery failed, retries exhausted"
                    );
                    return DispatchResult {
                        success: false,
                        status_code,
                        message: format!("Failed after {} attempts: {message}", attempt + 1),
                        retries: attempt,
                    };
                }
                Attempt::Retryable(status_code, message) => {
                    let delay = retry_delay * (attempt + 1);
                    debug!(
                        url = %request.url,
                        status = ?status_code,
                        error = %message,
                        delay_ms = delay.as_millis() as u64,
                        "Webhook attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each attempt happened.
    struct ScriptedTransport {
        script: Mutex<Vec<Result<u16, DispatchError>>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(mut script: Vec<Result<u16, DispatchError>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                attempts: Mutex::new(Vec::new()),
            })
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, _request: &DispatchRequest) -> Result<u16, DispatchError> {
            self.attempts.lock().unwrap().push(Instant::now());
            self.script.lock().unwrap().pop().unwrap_or(Ok(500))
        }
    }

    fn request() -> DispatchRequest {
        DispatchRequest {
            url: "http://hook.test/in".parse().unwrap(),
            method: reqwest::Method::POST,
            headers: IndexMap::new(),
            body: "{}".into(),
            content_type: "application/json",
            timeout: None,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let transport = ScriptedTransport::new(vec![Ok(204)]);
        let result = Dispatcher::new(transport.clone())
            .send(&request(), 3, Duration::from_millis(10))
            .await;
        assert!(result.success);
        assert_eq!(result.status_code, Some(204));
        assert_eq!(result.retries, 0);
        assert_eq!(transport.attempt_times().len(), 1);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(404)]);
        let result = Dispatcher::new(transport.clone())
            .send(&request(), 5, Duration::from_millis(10))
            .await;
        assert!(!result.success);
        assert_eq!(result.status_code, Some(404));
        assert_eq!(transport.attempt_times().len(), 1);
    }

    #[tokio::test]
    async fn server_error_retries_with_growing_delay() {
        let delay = Duration::from_millis(20);
        let transport = ScriptedTransport::new(vec![Ok(500), Ok(500), Ok(500)]);
        let result = Dispatcher::new(transport.clone())
            .send(&request(), 2, delay)
            .await;

        assert!(!result.success);
        assert_eq!(result.status_code, Some(500));
        assert_eq!(result.retries, 2);
        assert!(result.message.starts_with("Failed after 3 attempts"));

        let times = transport.attempt_times();
        assert_eq!(times.len(), 3);
        assert!(times[1] - times[0] >= delay);
        assert!(times[2] - times[1] >= delay * 2);
    }

    #[tokio::test]
    async fn transport_error_then_success() {
        let transport = ScriptedTransport::new(vec![
            Err(DispatchError::Transport("connection refused".into())),
            Err(DispatchError::Timeout(Duration::from_millis(5))),
            Ok(200),
        ]);
        let result = Dispatcher::new(transport.clone())
            .send(&request(), 2, Duration::from_millis(1))
            .await;
        assert!(result.success);
        assert_eq!(result.retries, 2);
    }

    #[tokio::test]
    async fn invalid_request_is_terminal() {
        let transport = ScriptedTransport::new(vec![Err(DispatchError::InvalidRequest("bad header".into()))]);
        let result = Dispatcher::new(transport.clone())
            .send(&request(), 3, Duration::from_millis(1))
            .await;
        assert!(!result.success);
        assert_eq!(result.status_code, None);
        assert_eq!(transport.attempt_times().len(), 1);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let transport = ScriptedTransport::new(vec![Ok(503)]);
        let result = Dispatcher::new(transport.clone())
            .send(&request(), 0, Duration::from_millis(1))
            .await;
        assert!(!result.success);
        assert_eq!(transport.attempt_times().len(), 1);
    }

    fn result(success: bool, status: u16) -> DispatchResult {
        DispatchResult {
            success,
            status_code: Some(status),
            message: String::new(),
            retries: 0,
        }
    }

    #[test]
    fn aggregate_success_if_any() {
        let agg = aggregate(vec![result(false, 500), result(true, 200)]);
        assert!(agg.success);
        assert_eq!(agg.status_code, Some(200));
        assert_eq!(agg.message, "At least one route succeeded");
        assert_eq!(agg.results.len(), 2);
    }

    #[test]
    fn aggregate_all_failed() {
        let agg = aggregate(vec![result(false, 503), result(false, 404)]);
        assert!(!agg.success);
        assert_eq!(agg.status_code, Some(503));
        assert_eq!(agg.message, "All routes failed");
    }

    #[test]
    fn aggregate_empty() {
        let agg = aggregate(Vec::new());
        assert!(!agg.success);
        assert_eq!(agg.status_code, None);
    }
}
