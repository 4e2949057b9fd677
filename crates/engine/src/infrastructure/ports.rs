//! Port traits for the generation backends.
//!
//! These are the only abstractions in the engine: one trait per modality
//! (text, image, video) so a backend can be swapped without touching the
//! pipeline or the orchestrator. Everything else is concrete types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

// =============================================================================
// Error Types
// =============================================================================

/// Failure classes for provider calls. The class determines the recovery
/// policy: Transient is retried with backoff, ContentRefused triggers the
/// fallback chain and is never retried on the same provider, Unavailable
/// means the call was never attempted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Transient(String),

    #[error("Provider refused content: {0}")]
    ContentRefused(String),

    #[error("Provider not configured: {0}")]
    Unavailable(&'static str),

    #[error("Provider timed out: {0}")]
    TimedOut(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether another attempt against the same provider can help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::TimedOut(_) | Self::InvalidResponse(_))
    }
}

/// Failure classes for the scene generation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Provider output could not be parsed into a scene draft.
    #[error("Malformed generation response: {0}")]
    MalformedResponse(String),

    /// A required draft field was absent.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

// =============================================================================
// Text Generation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait TextGenPort: Send + Sync {
    /// Run one completion over the conversation. Each attempt is
    /// independent; there is no partial credit.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError>;
}

// =============================================================================
// Image Generation
// =============================================================================

#[async_trait]
pub trait ImageGenPort: Send + Sync {
    /// Generate one image, optionally conditioned on reference photos.
    /// Returns raw image bytes.
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[PathBuf],
    ) -> Result<Vec<u8>, ProviderError>;
}

// =============================================================================
// Video Generation (submit-then-poll)
// =============================================================================

/// Opaque handle to a submitted video generation job.
#[derive(Debug, Clone)]
pub struct VideoJobId(pub String);

/// One poll of a video job: still cooking, or done with the clip bytes.
#[derive(Debug, Clone)]
pub enum VideoPoll {
    Pending,
    Ready(Vec<u8>),
}

#[async_trait]
pub trait VideoGenPort: Send + Sync {
    /// Submit a generation job. Prefers image-conditioned generation when a
    /// first frame is supplied, else text-conditioned.
    async fn submit(
        &self,
        prompt: &str,
        first_frame: Option<&Path>,
    ) -> Result<VideoJobId, ProviderError>;

    /// Poll a submitted job once.
    async fn poll(&self, job: &VideoJobId) -> Result<VideoPoll, ProviderError>;

    /// Interval between polls. Overridable so tests run fast.
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Poll budget before the job is declared timed out.
    fn max_polls(&self) -> u32 {
        60
    }

    /// Submit-then-poll driver: submit the job, then poll at
    /// `poll_interval` up to `max_polls` times. Exceeding the budget is
    /// `TimedOut`.
    async fn generate(
        &self,
        prompt: &str,
        first_frame: Option<&Path>,
    ) -> Result<Vec<u8>, ProviderError> {
        let job = self.submit(prompt, first_frame).await?;
        for _ in 0..self.max_polls() {
            tokio::time::sleep(self.poll_interval()).await;
            if let VideoPoll::Ready(bytes) = self.poll(&job).await? {
                return Ok(bytes);
            }
        }
        Err(ProviderError::TimedOut(format!(
            "video job {} not ready after {} polls",
            job.0,
            self.max_polls()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct SlowVideo {
        ready_after: u32,
        polls: AtomicU32,
    }

    #[async_trait]
    impl VideoGenPort for SlowVideo {
        async fn submit(
            &self,
            _prompt: &str,
            _first_frame: Option<&Path>,
        ) -> Result<VideoJobId, ProviderError> {
            Ok(VideoJobId("job-1".into()))
        }

        async fn poll(&self, _job: &VideoJobId) -> Result<VideoPoll, ProviderError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.ready_after {
                Ok(VideoPoll::Ready(vec![1, 2, 3]))
            } else {
                Ok(VideoPoll::Pending)
            }
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(1)
        }

        fn max_polls(&self) -> u32 {
            4
        }
    }

    #[tokio::test]
    async fn generate_polls_until_ready() {
        let port = SlowVideo {
            ready_after: 3,
            polls: AtomicU32::new(0),
        };
        let bytes = port.generate("a clip", None).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(port.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn generate_times_out_after_poll_budget() {
        let port = SlowVideo {
            ready_after: 100,
            polls: AtomicU32::new(0),
        };
        let err = port.generate("a clip", None).await.unwrap_err();
        assert!(matches!(err, ProviderError::TimedOut(_)));
        assert_eq!(port.polls.load(Ordering::SeqCst), 4);
    }
}
