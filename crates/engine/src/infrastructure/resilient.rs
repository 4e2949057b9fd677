//! Retrying text-generation wrapper with exponential backoff.
//!
//! Wraps any `TextGenPort` so transient provider failures are retried
//! before surfacing. Each attempt is independent; there is no partial
//! credit for a half-finished completion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::infrastructure::ports::{ChatMessage, ProviderError, TextGenPort};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first (2 retries = 3 total attempts).
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay_ms: u64,
    /// Cap on the exponential growth.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at `max_delay_ms`.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay_ms)
    }
}

/// Wrapper that adds retry logic to any text generation client.
pub struct RetryingTextClient {
    inner: Arc<dyn TextGenPort>,
    config: RetryConfig,
}

impl RetryingTextClient {
    pub fn new(inner: Arc<dyn TextGenPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl TextGenPort for RetryingTextClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.inner.complete(system, messages).await {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::info!(attempt = attempt + 1, "Text generation succeeded after retry");
                    }
                    return Ok(text);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(error = %e, "Text generation failed with non-retryable error");
                    return Err(e);
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        let delay = self.config.delay_ms(attempt + 1);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay,
                            error = %e,
                            "Text generation failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let error =
            last_error.unwrap_or_else(|| ProviderError::Transient("unknown failure".into()));
        tracing::error!(
            attempts = self.config.max_retries + 1,
            error = %error,
            "Text generation failed after all retry attempts"
        );
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock that fails a configurable number of times before succeeding.
    struct FailingMockText {
        failures_remaining: AtomicU32,
        attempts: AtomicU32,
        error: ProviderError,
    }

    impl FailingMockText {
        fn new(failure_count: u32, error: ProviderError) -> Self {
            Self {
                failures_remaining: AtomicU32::new(failure_count),
                attempts: AtomicU32::new(0),
                error,
            }
        }
    }

    #[async_trait]
    impl TextGenPort for FailingMockText {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                Err(self.error.clone())
            } else {
                Ok("{\"title\": \"ok\"}".to_string())
            }
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 10,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let mock = Arc::new(FailingMockText::new(0, ProviderError::Transient("x".into())));
        let client = RetryingTextClient::new(mock.clone(), fast_config());

        let result = client.complete("sys", &[ChatMessage::user("hi")]).await;

        assert!(result.is_ok());
        assert_eq!(mock.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn two_transient_failures_then_success_is_three_attempts() {
        let mock = Arc::new(FailingMockText::new(2, ProviderError::Transient("rate limited".into())));
        let client = RetryingTextClient::new(mock.clone(), fast_config());

        let result = client.complete("sys", &[ChatMessage::user("hi")]).await;

        assert!(result.is_ok());
        assert_eq!(mock.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fails_after_exhausting_attempts() {
        let mock = Arc::new(FailingMockText::new(10, ProviderError::Transient("down".into())));
        let client = RetryingTextClient::new(mock.clone(), fast_config());

        let result = client.complete("sys", &[ChatMessage::user("hi")]).await;

        assert!(result.is_err());
        assert_eq!(mock.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn content_refusal_is_not_retried() {
        let mock = Arc::new(FailingMockText::new(
            10,
            ProviderError::ContentRefused("blocked".into()),
        ));
        let client = RetryingTextClient::new(mock.clone(), fast_config());

        let result = client.complete("sys", &[ChatMessage::user("hi")]).await;

        assert!(matches!(result, Err(ProviderError::ContentRefused(_))));
        assert_eq!(mock.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_from_base() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        };
        assert_eq!(config.delay_ms(1), 1000);
        assert_eq!(config.delay_ms(2), 2000);
        assert_eq!(config.delay_ms(3), 4000);
        assert_eq!(config.delay_ms(6), 30_000);
    }
}
