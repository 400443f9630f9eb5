//! Executes a single logical request with constant-backoff retries.

use std::time::Duration;

use tracing::debug;

use crate::transport::{RequestDescriptor, Transport};

/// Fixed-delay retry policy applied to the transport send step only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn constant(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::constant(5, Duration::from_millis(50))
    }
}

/// Which response statuses count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedStatus {
    /// Any 2xx
    AnySuccess,
    Exact(u16),
}

impl ExpectedStatus {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            ExpectedStatus::AnySuccess => (200..300).contains(&status),
            ExpectedStatus::Exact(code) => *code == status,
        }
    }
}

/// Classified result of one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { status: u16, bytes: usize },
    /// Every attempt failed before a response came back.
    TransportExhausted { attempts: u32, error: String },
    /// A response came back with a status outside [`ExpectedStatus`].
    UnexpectedStatus { status: u16, body: String },
}

/// Runs requests against a borrowed client with a retry policy.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    retry: RetryPolicy,
    expected: ExpectedStatus,
}

impl ResilientExecutor {
    pub fn new(retry: RetryPolicy, expected: ExpectedStatus) -> Self {
        Self { retry, expected }
    }

    /// Execute a request, retrying transport errors only. Status codes are never retried.
    pub async fn execute<C>(&self, client: &C, request: &RequestDescriptor) -> Outcome
    where
        C: Transport + ?Sized,
    {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        let response = loop {
            attempt += 1;
            match client.send(request).await {
                Ok(response) => break response,
                Err(e) if attempt >= max_attempts => {
                    return Outcome::TransportExhausted {
                        attempts: attempt,
                        error: e.to_string(),
                    };
                }
                Err(e) => {
                    debug!(
                        url = %request.url,
                        error = %e,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        };

        if self.expected.matches(response.status) {
            Outcome::Success {
                status: response.status,
                bytes: response.body.len(),
            }
        } else {
            Outcome::UnexpectedStatus {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, TransportResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` sends, then answers with `status`.
    struct FlakyClient {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    impl FlakyClient {
        fn new(failures: u32, status: u16) -> Self {
            Self {
                failures,
                status,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyClient {
        async fn send(&self, _request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(TransportError::Connection("connection refused".to_string()));
            }
            Ok(TransportResponse {
                status: self.status,
                body: Bytes::from_static(b"tile"),
            })
        }
    }

    fn executor(max_retries: u32) -> ResilientExecutor {
        ResilientExecutor::new(
            RetryPolicy::constant(max_retries, Duration::from_millis(1)),
            ExpectedStatus::AnySuccess,
        )
    }

    fn request() -> RequestDescriptor {
        RequestDescriptor::get("http://localhost/14/8471/5564.png")
    }

    #[test]
    fn test_expected_status_matching() {
        assert!(ExpectedStatus::AnySuccess.matches(200));
        assert!(ExpectedStatus::AnySuccess.matches(204));
        assert!(!ExpectedStatus::AnySuccess.matches(304));
        assert!(!ExpectedStatus::AnySuccess.matches(503));
        assert!(ExpectedStatus::Exact(200).matches(200));
        assert!(!ExpectedStatus::Exact(200).matches(201));
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let client = FlakyClient::new(0, 200);
        let outcome = executor(5).execute(&client, &request()).await;
        assert_eq!(outcome, Outcome::Success { status: 200, bytes: 4 });
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_errors() {
        let client = FlakyClient::new(3, 200);
        let outcome = executor(5).execute(&client, &request()).await;
        assert!(matches!(outcome, Outcome::Success { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhausts_after_all_attempts() {
        let client = FlakyClient::new(u32::MAX, 200);
        let outcome = executor(5).execute(&client, &request()).await;
        match outcome {
            Outcome::TransportExhausted { attempts, error } => {
                assert_eq!(attempts, 6);
                assert!(error.contains("connection refused"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_unexpected_status_is_not_retried() {
        let client = FlakyClient::new(0, 503);
        let outcome = executor(5).execute(&client, &request()).await;
        assert_eq!(
            outcome,
            Outcome::UnexpectedStatus {
                status: 503,
                body: "tile".to_string()
            }
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_means_single_attempt() {
        let client = FlakyClient::new(1, 200);
        let outcome = executor(0).execute(&client, &request()).await;
        assert!(matches!(outcome, Outcome::TransportExhausted { attempts: 1, .. }));
    }
}
