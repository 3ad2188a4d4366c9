use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_common::Result;

use crate::client::{LlmClient, LlmRequest, LlmResponse};

/// Lowercase fragments of provider errors worth another attempt: rate
/// limits, 5xx responses and transport failures.
const TRANSIENT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "500",
    "502",
    "503",
    "504",
    "server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "timed out",
    "connection",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff for the given zero-based attempt, plus up to 10%
    /// jitter, capped at `max_delay_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let jitter = base * 0.1 * rand::thread_rng().gen::<f64>();
        let millis = (base + jitter).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

fn is_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Seconds from a `Retry-After: N` suffix the providers append to error text.
fn retry_after(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();
    let rest = &lower[lower.find("retry-after")? + "retry-after".len()..];
    let digits: String = rest
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok().map(Duration::from_secs)
}

/// Retries transient provider failures with exponential backoff, honouring
/// a server-sent `Retry-After`.
pub struct RetryingClient<T: LlmClient> {
    inner: T,
    config: RetryConfig,
}

impl<T: LlmClient> RetryingClient<T> {
    pub fn new(inner: T, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<T: LlmClient> LlmClient for RetryingClient<T> {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let cap = Duration::from_millis(self.config.max_delay_ms);

        let mut attempt = 0;
        loop {
            let error = match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            let message = error.to_string();
            if attempt >= self.config.max_retries || !is_transient(&message) {
                return Err(error);
            }

            let delay = retry_after(&message)
                .unwrap_or_else(|| self.config.backoff(attempt))
                .min(cap);
            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Retrying provider call"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_common::VigilError;

    #[test]
    fn transient_errors_are_recognised() {
        assert!(is_transient("OpenAI API error 429 Too Many Requests: rate limit exceeded"));
        assert!(is_transient("Anthropic API error 503 Service Unavailable"));
        assert!(is_transient("OpenAI request failed: operation timed out"));
        assert!(!is_transient("OpenAI API error 401 Unauthorized"));
        assert!(!is_transient("Failed to parse Anthropic response: missing field"));
    }

    #[test]
    fn retry_after_suffix_parsed() {
        let msg = "OpenAI API error 429 Too Many Requests: slow down, Retry-After: 5";
        assert_eq!(retry_after(msg), Some(Duration::from_secs(5)));
        assert_eq!(retry_after("503 Service Unavailable"), None);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
            backoff_multiplier: 10.0,
        };
        let first = config.backoff(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(110));
        assert_eq!(config.backoff(5), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let client = RetryingClient::new(FlakyClient::new(2, "503 Service Unavailable"), fast(3));
        let response = client.complete(LlmRequest::default()).await.unwrap();
        assert_eq!(response.content, "recovered");
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let client = RetryingClient::new(FlakyClient::new(10, "429 Too Many Requests"), fast(2));
        assert!(client.complete(LlmRequest::default()).await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let client = RetryingClient::new(FlakyClient::new(10, "API error 401 Unauthorized"), fast(3));
        assert!(client.complete(LlmRequest::default()).await.is_err());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct FlakyClient {
        failures: usize,
        error: &'static str,
        calls: AtomicUsize,
    }

    impl FlakyClient {
        fn new(failures: usize, error: &'static str) -> Self {
            Self {
                failures,
                error,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _request: LlmRequest) -> Result<LlmResponse> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(VigilError::Llm(self.error.to_string()));
            }
            Ok(LlmResponse::text("flaky", "recovered"))
        }
    }
}
