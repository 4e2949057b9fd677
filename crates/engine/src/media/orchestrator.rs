//! Async media orchestration over live sessions.
//!
//! Every unit of work is a spawned task that owns a clone of the shared
//! session and mutates only its own `Image`'s status through the write
//! lock, always passing through Generating before a terminal state.
//! Media failures never roll back or abort the owning scene or session;
//! they land on the image as a Failed status and an error message.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fableforge_domain::{Image, ImageStatus, SceneId, Story, StoryId, VideoStatus};
use rand::seq::SliceRandom;

use crate::generation::directives::is_picture_book_age;
use crate::infrastructure::ports::ProviderError;
use crate::infrastructure::registry::{ImageProviderId, ProviderResolver, IMAGE_FALLBACK_ORDER};
use crate::media::store::MediaStore;
use crate::stores::session_store::SharedSession;

/// Ceiling on reference images passed to an image provider.
pub const MAX_REFERENCE_IMAGES: usize = 3;

/// Composition variations for picture-book extra illustrations.
const EXTRA_IMAGE_VARIATIONS: [&str; 2] = [
    "close-up portrait composition focusing on the main character's face and expression",
    "wide panoramic composition showing the full environment and setting",
];

/// Variation hints appended when regenerating an image that already
/// completed, so the retry produces a different composition.
const RETRY_VARIATION_HINTS: [&str; 6] = [
    "from a different camera angle",
    "with different lighting and mood",
    "from a low dramatic angle",
    "from a bird's-eye view",
    "with a different color palette",
    "focusing on a different part of the scene",
];

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Total attempts per provider for transient failures.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Video chaining: how often to check the scene image's status.
    pub chain_poll_ms: u64,
    /// Video chaining: give up waiting for the image after this long.
    pub chain_max_wait_ms: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            chain_poll_ms: 2000,
            chain_max_wait_ms: 120_000,
        }
    }
}

/// Resolve the reference images for a story's next image generation.
///
/// Direct uploads win outright; otherwise cast character photos, then the
/// rolling reference from the last completed scene image. Capped at
/// [`MAX_REFERENCE_IMAGES`] either way.
pub fn reference_images(story: &Story) -> Vec<PathBuf> {
    if !story.reference_photo_paths.is_empty() {
        return story
            .reference_photo_paths
            .iter()
            .take(MAX_REFERENCE_IMAGES)
            .cloned()
            .collect();
    }
    let mut refs: Vec<PathBuf> = story.character_photo_paths.clone();
    if let Some(rolling) = &story.rolling_reference_path {
        refs.push(rolling.clone());
    }
    refs.truncate(MAX_REFERENCE_IMAGES);
    refs
}

pub async fn image_status_of(session: &SharedSession, scene_id: SceneId) -> Option<ImageStatus> {
    session.read().await.scene(scene_id).map(|s| s.image.status)
}

pub async fn video_status_of(session: &SharedSession, scene_id: SceneId) -> Option<VideoStatus> {
    session
        .read()
        .await
        .scene(scene_id)
        .map(|s| s.image.video_status)
}

#[derive(Clone)]
pub struct MediaOrchestrator {
    resolver: Arc<dyn ProviderResolver>,
    store: Arc<MediaStore>,
    config: MediaConfig,
}

impl MediaOrchestrator {
    pub fn new(resolver: Arc<dyn ProviderResolver>, store: Arc<MediaStore>) -> Self {
        Self {
            resolver,
            store,
            config: MediaConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MediaConfig) -> Self {
        self.config = config;
        self
    }

    /// Kick off all media for a freshly attached scene: the primary image,
    /// picture-book extras when the protagonist age calls for them, and
    /// the chained video when the story runs in video mode.
    pub async fn spawn_scene_media(&self, session: SharedSession, scene_id: SceneId) {
        let (picture_book, video_mode) = {
            let guard = session.read().await;
            (
                is_picture_book_age(&guard.story.protagonist_age),
                guard.story.video_mode,
            )
        };
        self.spawn_scene_image(session.clone(), scene_id);
        if picture_book {
            self.spawn_extra_images(session.clone(), scene_id);
        }
        if video_mode {
            self.spawn_video_chained(session, scene_id);
        }
    }

    pub fn spawn_scene_image(&self, session: SharedSession, scene_id: SceneId) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_scene_image(session, scene_id).await;
        });
    }

    pub fn spawn_extra_images(&self, session: SharedSession, scene_id: SceneId) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_extra_images(session, scene_id).await;
        });
    }

    pub fn spawn_video_chained(&self, session: SharedSession, scene_id: SceneId) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_video_chained(session, scene_id).await;
        });
    }

    /// User-triggered image regeneration. No-op while a generation is
    /// already running. Retrying a completed image appends a random
    /// variation hint so the new render differs in composition.
    pub async fn retry_image(&self, session: SharedSession, scene_id: SceneId) -> bool {
        let respawn = {
            let mut guard = session.write().await;
            let Some(scene) = guard.scene_mut(scene_id) else {
                return false;
            };
            match scene.image.status {
                ImageStatus::Generating => false,
                status => {
                    if status == ImageStatus::Complete {
                        if let Some(hint) = RETRY_VARIATION_HINTS.choose(&mut rand::thread_rng())
                        {
                            scene.image.prompt = format!("{}, {hint}", scene.image.prompt);
                        }
                    }
                    scene.image.reset_for_retry();
                    true
                }
            }
        };
        if respawn {
            self.spawn_scene_image(session, scene_id);
        }
        respawn
    }

    pub async fn retry_extra_image(
        &self,
        session: SharedSession,
        scene_id: SceneId,
        index: usize,
    ) -> bool {
        let respawn = {
            let mut guard = session.write().await;
            let Some(image) = guard
                .scene_mut(scene_id)
                .and_then(|s| s.extra_images.get_mut(index))
            else {
                return false;
            };
            if image.status == ImageStatus::Generating {
                false
            } else {
                image.reset_for_retry();
                true
            }
        };
        if respawn {
            let this = self.clone();
            tokio::spawn(async move {
                let (provider, prompt, refs) = {
                    let guard = session.read().await;
                    let story_provider = parse_image_provider(&guard.story.image_provider);
                    let provider = this.resolver.fast_image_provider(story_provider);
                    let refs = reference_images(&guard.story);
                    let Some(prompt) = guard
                        .scene(scene_id)
                        .and_then(|s| s.extra_images.get(index))
                        .map(|i| i.prompt.clone())
                    else {
                        return;
                    };
                    (provider, prompt, refs)
                };
                this.run_one_extra(session, scene_id, index, provider, prompt, refs)
                    .await;
            });
        }
        respawn
    }

    pub async fn retry_video(&self, session: SharedSession, scene_id: SceneId) -> bool {
        let respawn = {
            let mut guard = session.write().await;
            let Some(scene) = guard.scene_mut(scene_id) else {
                return false;
            };
            if scene.image.video_status == VideoStatus::Generating {
                false
            } else {
                scene.image.reset_video_for_retry();
                true
            }
        };
        if respawn {
            self.spawn_video_chained(session, scene_id);
        }
        respawn
    }

    /// Cover art for a completed story. Synchronous from the caller's
    /// point of view; the flow service spawns and owns the archive update.
    pub async fn generate_cover(
        &self,
        provider_key: &str,
        story_id: StoryId,
        prompt: &str,
    ) -> anyhow::Result<String> {
        let provider = parse_image_provider(provider_key);
        let (bytes, used) = self.generate_with_fallback(provider, prompt, &[]).await?;
        let stored = self.store.save_cover(story_id, &bytes)?;
        tracing::info!(%story_id, provider = used.key(), "Cover art complete");
        Ok(stored.url)
    }

    async fn run_scene_image(&self, session: SharedSession, scene_id: SceneId) {
        let (prompt, provider_key, refs) = {
            let mut guard = session.write().await;
            let provider_key = guard.story.image_provider.clone();
            let refs = reference_images(&guard.story);
            let Some(scene) = guard.scene_mut(scene_id) else {
                return;
            };
            scene.image.mark_generating();
            (scene.image.prompt.clone(), provider_key, refs)
        };

        let provider = parse_image_provider(&provider_key);
        let outcome = self.generate_with_fallback(provider, &prompt, &refs).await;

        let mut guard = session.write().await;
        match outcome {
            Ok((bytes, used)) => match self.store.save_scene_image(scene_id, &bytes) {
                Ok(stored) => {
                    guard.story.rolling_reference_path = Some(stored.path.clone());
                    if let Some(scene) = guard.scene_mut(scene_id) {
                        scene.image.complete(stored.url);
                    }
                    tracing::info!(%scene_id, provider = used.key(), "Scene image complete");
                }
                Err(e) => {
                    tracing::error!(%scene_id, error = %e, "Failed to store scene image");
                    if let Some(scene) = guard.scene_mut(scene_id) {
                        scene.image.fail(e.to_string());
                    }
                }
            },
            Err(e) => {
                tracing::warn!(%scene_id, error = %e, "Scene image generation failed");
                if let Some(scene) = guard.scene_mut(scene_id) {
                    scene.image.fail(e.to_string());
                }
            }
        }
    }

    async fn run_extra_images(&self, session: SharedSession, scene_id: SceneId) {
        let (provider, jobs, refs) = {
            let mut guard = session.write().await;
            let story_provider = parse_image_provider(&guard.story.image_provider);
            let provider = self.resolver.fast_image_provider(story_provider);
            let refs = reference_images(&guard.story);
            let Some(scene) = guard.scene_mut(scene_id) else {
                return;
            };
            let base = scene.image.prompt.clone();
            let start = scene.extra_images.len();
            let mut jobs = Vec::with_capacity(EXTRA_IMAGE_VARIATIONS.len());
            for (offset, variation) in EXTRA_IMAGE_VARIATIONS.iter().enumerate() {
                let prompt = format!("{base}, {variation}");
                scene.extra_images.push(Image::new(prompt.clone()));
                jobs.push((start + offset, prompt));
            }
            (provider, jobs, refs)
        };

        let tasks = jobs.into_iter().map(|(index, prompt)| {
            let session = session.clone();
            let refs = refs.clone();
            async move {
                self.run_one_extra(session, scene_id, index, provider, prompt, refs)
                    .await;
            }
        });
        futures_util::future::join_all(tasks).await;
    }

    /// One extra-illustration unit. Failures are contained to this image.
    async fn run_one_extra(
        &self,
        session: SharedSession,
        scene_id: SceneId,
        index: usize,
        provider: ImageProviderId,
        prompt: String,
        refs: Vec<PathBuf>,
    ) {
        {
            let mut guard = session.write().await;
            let Some(image) = guard
                .scene_mut(scene_id)
                .and_then(|s| s.extra_images.get_mut(index))
            else {
                return;
            };
            image.mark_generating();
        }

        let outcome = match self.generate_once(provider, &prompt, &refs).await {
            Ok(bytes) => self
                .store
                .save_extra_image(scene_id, index, &bytes)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let mut guard = session.write().await;
        let Some(image) = guard
            .scene_mut(scene_id)
            .and_then(|s| s.extra_images.get_mut(index))
        else {
            return;
        };
        match outcome {
            Ok(stored) => image.complete(stored.url),
            Err(e) => {
                tracing::warn!(%scene_id, index, error = %e, "Extra image failed");
                image.fail(e);
            }
        }
    }

    /// Wait for the scene image to settle, then chain video generation off
    /// it. If the image never reaches a terminal status within the wait
    /// budget, or failed, the video is skipped: not started, not failed.
    async fn run_video_chained(&self, session: SharedSession, scene_id: SceneId) {
        {
            let mut guard = session.write().await;
            let Some(scene) = guard.scene_mut(scene_id) else {
                return;
            };
            scene.image.video_status = VideoStatus::Pending;
        }

        let mut waited_ms = 0u64;
        let image_status = loop {
            let Some(status) = image_status_of(&session, scene_id).await else {
                return;
            };
            if status.is_terminal() {
                break status;
            }
            if waited_ms >= self.config.chain_max_wait_ms {
                break status;
            }
            tokio::time::sleep(Duration::from_millis(self.config.chain_poll_ms)).await;
            waited_ms += self.config.chain_poll_ms;
        };

        if image_status != ImageStatus::Complete {
            tracing::info!(%scene_id, ?image_status, "Skipping video: scene image not complete");
            let mut guard = session.write().await;
            if let Some(scene) = guard.scene_mut(scene_id) {
                scene.image.video_status = VideoStatus::None;
            }
            return;
        }

        let prompt = {
            let guard = session.read().await;
            let Some(scene) = guard.scene(scene_id) else {
                return;
            };
            scene.image.prompt.clone()
        };

        let provider = match self.resolver.video() {
            Ok(provider) => provider,
            Err(e) => {
                let mut guard = session.write().await;
                if let Some(scene) = guard.scene_mut(scene_id) {
                    scene.image.fail_video(e.to_string());
                }
                return;
            }
        };

        {
            let mut guard = session.write().await;
            if let Some(scene) = guard.scene_mut(scene_id) {
                scene.image.mark_video_generating();
            }
        }

        let first_frame_path = self.store.image_path(scene_id);
        let first_frame = self
            .store
            .has_image(scene_id)
            .then_some(first_frame_path.as_path());

        let outcome = match provider.generate(&prompt, first_frame).await {
            Ok(bytes) => self
                .store
                .save_video(scene_id, &bytes)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let mut guard = session.write().await;
        let Some(scene) = guard.scene_mut(scene_id) else {
            return;
        };
        match outcome {
            Ok(stored) => {
                scene.image.complete_video(stored.url);
                tracing::info!(%scene_id, "Scene video complete");
            }
            Err(e) => {
                tracing::warn!(%scene_id, error = %e, "Scene video failed");
                scene.image.fail_video(e);
            }
        }
    }

    /// Generate through `primary`, walking the fallback order when the
    /// provider refuses the content.
    ///
    /// A refusing provider is never retried. If every fallback also
    /// fails, the PRIMARY provider's refusal is what surfaces, since
    /// that is the message the reader's prompt actually triggered.
    pub async fn generate_with_fallback(
        &self,
        primary: ImageProviderId,
        prompt: &str,
        refs: &[PathBuf],
    ) -> Result<(Vec<u8>, ImageProviderId), ProviderError> {
        match self.generate_once(primary, prompt, refs).await {
            Ok(bytes) => Ok((bytes, primary)),
            Err(original @ ProviderError::ContentRefused(_)) => {
                tracing::warn!(provider = primary.key(), "Content refused; trying fallbacks");
                for candidate in IMAGE_FALLBACK_ORDER {
                    if candidate == primary {
                        continue;
                    }
                    match self.generate_once(candidate, prompt, refs).await {
                        Ok(bytes) => {
                            tracing::info!(
                                provider = candidate.key(),
                                "Fallback provider accepted refused content"
                            );
                            return Ok((bytes, candidate));
                        }
                        Err(e) => {
                            tracing::warn!(provider = candidate.key(), error = %e, "Fallback failed");
                        }
                    }
                }
                Err(original)
            }
            Err(e) => Err(e),
        }
    }

    /// One provider, up to `max_attempts` tries with exponential backoff
    /// on retryable errors.
    async fn generate_once(
        &self,
        id: ImageProviderId,
        prompt: &str,
        refs: &[PathBuf],
    ) -> Result<Vec<u8>, ProviderError> {
        let port = self.resolver.image(id)?;
        let mut attempt = 1u32;
        loop {
            match port.generate(prompt, refs).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = (self.config.base_delay_ms << (attempt - 1))
                        .min(self.config.max_delay_ms);
                    tracing::warn!(
                        provider = id.key(),
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "Image generation attempt failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Legacy keys in saved stories fall back to the default image model.
fn parse_image_provider(key: &str) -> ImageProviderId {
    key.parse().unwrap_or(ImageProviderId::GptImage1)
}
