//! Story flow service: the use-case seam a serving layer calls.
//!
//! Text generation is awaited inline, so a provider failure leaves the
//! scene tree untouched. Media is fire-and-forget through the
//! orchestrator. After every tree mutation the session is snapshotted to
//! its category's progress slot; reaching an ending promotes the session
//! to a completed-story record instead.

use std::path::PathBuf;
use std::sync::Arc;

use fableforge_domain::{
    Choice, ChoiceId, DomainError, Image, Scene, SceneId, SessionId, Story, StoryId, StoryLength,
    StorySession,
};

use crate::generation::directives::Directives;
use crate::generation::pipeline::{ScenePipeline, SceneRequest};
use crate::generation::prompts::ChapterPlacement;
use crate::infrastructure::ports::{GenerationError, ProviderError, TextGenPort};
use crate::infrastructure::registry::{ProviderResolver, TextProviderId};
use crate::media::orchestrator::MediaOrchestrator;
use crate::stores::archive::{ArchiveError, ArchivePort};
use crate::stores::session_store::{SessionStore, SharedSession};

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Unknown provider key: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Everything the reader picks on the story setup screen.
#[derive(Debug, Clone)]
pub struct NewStoryParams {
    pub title: String,
    pub prompt: String,
    pub length: StoryLength,
    pub category: String,
    pub text_provider: String,
    pub image_provider: String,
    pub video_mode: bool,
    pub bedtime_mode: bool,
    pub art_style: String,
    pub protagonist_age: String,
    pub character_name: String,
    pub character_description: String,
    pub reference_photo_paths: Vec<PathBuf>,
    pub character_photo_paths: Vec<PathBuf>,
    pub parent_story_id: Option<StoryId>,
}

pub struct StoryFlow {
    resolver: Arc<dyn ProviderResolver>,
    pipeline: ScenePipeline,
    media: MediaOrchestrator,
    sessions: Arc<dyn SessionStore>,
    archive: Arc<dyn ArchivePort>,
    base_content_guidelines: String,
    base_image_style: String,
}

impl StoryFlow {
    pub fn new(
        resolver: Arc<dyn ProviderResolver>,
        pipeline: ScenePipeline,
        media: MediaOrchestrator,
        sessions: Arc<dyn SessionStore>,
        archive: Arc<dyn ArchivePort>,
    ) -> Self {
        Self {
            resolver,
            pipeline,
            media,
            sessions,
            archive,
            base_content_guidelines: String::new(),
            base_image_style: String::new(),
        }
    }

    /// Baseline directives applied to every story (a content profile and
    /// house image style), before per-story directives are appended.
    pub fn with_base_directives(mut self, guidelines: &str, style: &str) -> Self {
        self.base_content_guidelines = guidelines.to_string();
        self.base_image_style = style.to_string();
        self
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start a new story: generate the opening scene, register the
    /// session, kick off its media, and claim the category's progress
    /// slot (replacing whatever was there).
    pub async fn start_story(
        &self,
        params: NewStoryParams,
    ) -> Result<(SessionId, SharedSession), FlowError> {
        self.archive.delete_in_progress(&params.category)?;

        let story = Story {
            story_id: StoryId::new(),
            title: params.title,
            prompt: params.prompt,
            length: params.length,
            target_depth: params.length.target_depth(),
            category: params.category,
            text_provider: params.text_provider,
            image_provider: params.image_provider,
            video_mode: params.video_mode,
            bedtime_mode: params.bedtime_mode,
            art_style: params.art_style,
            protagonist_age: params.protagonist_age,
            character_name: params.character_name,
            character_description: params.character_description,
            reference_photo_paths: params.reference_photo_paths,
            character_photo_paths: params.character_photo_paths,
            rolling_reference_path: None,
            parent_story_id: params.parent_story_id,
            created_at: chrono::Utc::now(),
            // Placeholder; StorySession::start sets the real cursor.
            current_scene_id: SceneId::new(),
        };

        let directives = self.directives_for(&story);
        let provider = self.text_provider_for(&story)?;
        let draft = self
            .pipeline
            .generate_scene(
                provider,
                SceneRequest {
                    prompt: &story.prompt,
                    length: story.length,
                    context_scenes: &[],
                    current_depth: 0,
                    target_depth: story.target_depth,
                    choice_text: None,
                    directives: &directives,
                    chapters: chapters_for(&story, 0),
                },
            )
            .await?;

        let mut scene = Scene::root(
            draft.content,
            Image::new(draft.image_prompt),
            draft.choices.into_iter().map(Choice::new).collect(),
            draft.is_ending,
        );
        scene.chapter_number = story.chapter_for_depth(0);
        scene.chapter_title = draft.chapter_title;
        let scene_id = scene.scene_id;

        tracing::info!(story_id = %story.story_id, %scene_id, "Story started");
        let (session_id, shared) = self.sessions.insert(StorySession::start(story, scene));
        self.media.spawn_scene_media(shared.clone(), scene_id).await;
        self.finalize_step(&shared).await?;
        Ok((session_id, shared))
    }

    /// Take a choice on a scene. An already-explored choice is a memoized
    /// edge: jump to the existing branch instead of regenerating it.
    pub async fn choose(
        &self,
        session_id: SessionId,
        scene_id: SceneId,
        choice_id: ChoiceId,
    ) -> Result<SceneId, FlowError> {
        let shared = self.session(session_id)?;

        let (memoized, choice_text) = {
            let guard = shared.read().await;
            let scene = guard
                .scene(scene_id)
                .ok_or_else(|| DomainError::not_found("Scene", scene_id.to_string()))?;
            let choice = scene
                .find_choice(choice_id)
                .ok_or_else(|| DomainError::not_found("Choice", choice_id.to_string()))?;
            (choice.next_scene_id, choice.text.clone())
        };

        if let Some(next_id) = memoized {
            shared.write().await.jump_to(next_id)?;
            self.finalize_step(&shared).await?;
            return Ok(next_id);
        }

        self.extend(&shared, scene_id, choice_id, choice_text).await
    }

    /// Reader-written direction: attach an ad-hoc choice to the scene and
    /// continue through it.
    pub async fn custom_choice(
        &self,
        session_id: SessionId,
        scene_id: SceneId,
        text: String,
    ) -> Result<SceneId, FlowError> {
        let shared = self.session(session_id)?;

        let choice_id = {
            let mut guard = shared.write().await;
            let scene = guard
                .scene_mut(scene_id)
                .ok_or_else(|| DomainError::not_found("Scene", scene_id.to_string()))?;
            if scene.is_ending {
                return Err(DomainError::constraint("Cannot branch from an ending scene").into());
            }
            let choice = Choice::new(text.clone());
            let id = choice.choice_id;
            scene.choices.push(choice);
            id
        };

        self.extend(&shared, scene_id, choice_id, text).await
    }

    pub async fn go_back(&self, session_id: SessionId) -> Result<Option<SceneId>, FlowError> {
        let shared = self.session(session_id)?;
        let moved = {
            let mut guard = shared.write().await;
            guard.go_back().map(|s| s.scene_id)
        };
        if moved.is_some() {
            self.finalize_step(&shared).await?;
        }
        Ok(moved)
    }

    pub async fn jump_to(
        &self,
        session_id: SessionId,
        scene_id: SceneId,
    ) -> Result<SceneId, FlowError> {
        let shared = self.session(session_id)?;
        shared.write().await.jump_to(scene_id)?;
        self.finalize_step(&shared).await?;
        Ok(scene_id)
    }

    /// Load the category's progress slot back into a live session.
    pub fn resume(
        &self,
        category: &str,
    ) -> Result<Option<(SessionId, SharedSession)>, FlowError> {
        let Some(session) = self.archive.load_in_progress(category)? else {
            return Ok(None);
        };
        tracing::info!(category, story_id = %session.story.story_id, "Resuming story");
        Ok(Some(self.sessions.insert(session)))
    }

    /// Drop a live session and release its category's progress slot.
    pub async fn abandon(&self, session_id: SessionId) -> Result<(), FlowError> {
        let Some(shared) = self.sessions.remove(session_id) else {
            return Err(FlowError::SessionNotFound(session_id));
        };
        let category = shared.read().await.story.category.clone();
        self.archive.delete_in_progress(&category)?;
        Ok(())
    }

    /// "Story so far" recap, cached per path prefix so revisiting the
    /// same point never pays for a second provider call.
    pub async fn recap(&self, session_id: SessionId) -> Result<String, FlowError> {
        let shared = self.session(session_id)?;
        let (key, cached, scenes, story) = {
            let guard = shared.read().await;
            let key = guard.recap_key(guard.path_history.len());
            let cached = guard.cached_recap(&key).map(str::to_string);
            let scenes: Vec<Scene> = guard.full_context().into_iter().cloned().collect();
            (key, cached, scenes, guard.story.clone())
        };
        if let Some(text) = cached {
            return Ok(text);
        }

        let directives = self.directives_for(&story);
        let recap_style = if story.bedtime_mode {
            "Keep the tone gentle, soothing, and sleepy."
        } else {
            ""
        };
        let provider = self.text_provider_for(&story)?;
        let text = self
            .pipeline
            .generate_recap(provider, &scenes, &directives.content_guidelines, recap_style)
            .await;
        if !text.is_empty() {
            shared.write().await.cache_recap(key, text.clone());
        }
        Ok(text)
    }

    // -------------------------------------------------------------------------
    // Media passthroughs
    // -------------------------------------------------------------------------

    pub async fn retry_image(
        &self,
        session_id: SessionId,
        scene_id: SceneId,
    ) -> Result<bool, FlowError> {
        let shared = self.session(session_id)?;
        Ok(self.media.retry_image(shared, scene_id).await)
    }

    pub async fn retry_extra_image(
        &self,
        session_id: SessionId,
        scene_id: SceneId,
        index: usize,
    ) -> Result<bool, FlowError> {
        let shared = self.session(session_id)?;
        Ok(self.media.retry_extra_image(shared, scene_id, index).await)
    }

    pub async fn retry_video(
        &self,
        session_id: SessionId,
        scene_id: SceneId,
    ) -> Result<bool, FlowError> {
        let shared = self.session(session_id)?;
        Ok(self.media.retry_video(shared, scene_id).await)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn session(&self, session_id: SessionId) -> Result<SharedSession, FlowError> {
        self.sessions
            .get(session_id)
            .ok_or(FlowError::SessionNotFound(session_id))
    }

    fn directives_for(&self, story: &Story) -> Directives {
        Directives::for_story(story, &self.base_content_guidelines, &self.base_image_style)
    }

    fn text_provider_for(&self, story: &Story) -> Result<Arc<dyn TextGenPort>, FlowError> {
        let id: TextProviderId = story
            .text_provider
            .parse()
            .map_err(|()| FlowError::UnknownProvider(story.text_provider.clone()))?;
        Ok(self.resolver.text(id)?)
    }

    /// Generate a new branch through `choice_id` on `parent_scene_id` and
    /// attach it. A generation failure returns before any tree mutation.
    async fn extend(
        &self,
        shared: &SharedSession,
        parent_scene_id: SceneId,
        choice_id: ChoiceId,
        choice_text: String,
    ) -> Result<SceneId, FlowError> {
        {
            let mut guard = shared.write().await;
            if guard.story.current_scene_id != parent_scene_id {
                guard.jump_to(parent_scene_id)?;
            }
        }

        let (story, context) = {
            let guard = shared.read().await;
            let context: Vec<Scene> = guard.full_context().into_iter().cloned().collect();
            (guard.story.clone(), context)
        };
        let depth = context.last().map_or(0, |s| s.depth + 1);

        let directives = self.directives_for(&story);
        let provider = self.text_provider_for(&story)?;
        let draft = self
            .pipeline
            .generate_scene(
                provider,
                SceneRequest {
                    prompt: &story.prompt,
                    length: story.length,
                    context_scenes: &context,
                    current_depth: depth,
                    target_depth: story.target_depth,
                    choice_text: Some(&choice_text),
                    directives: &directives,
                    chapters: chapters_for(&story, depth),
                },
            )
            .await?;

        let new_id = {
            let mut guard = shared.write().await;
            let mut scene = {
                let parent = guard
                    .scene(parent_scene_id)
                    .ok_or_else(|| DomainError::not_found("Scene", parent_scene_id.to_string()))?;
                Scene::child_of(
                    parent,
                    choice_id,
                    draft.content,
                    Image::new(draft.image_prompt),
                    draft.choices.into_iter().map(Choice::new).collect(),
                    draft.is_ending,
                )
            };
            scene.chapter_number = guard.story.chapter_for_depth(scene.depth);
            scene.chapter_title = draft.chapter_title;
            let id = scene.scene_id;

            if let Some(choice) = guard
                .scene_mut(parent_scene_id)
                .and_then(|s| s.find_choice_mut(choice_id))
            {
                choice.next_scene_id = Some(id);
            }
            guard.advance(scene);
            id
        };

        self.media.spawn_scene_media(shared.clone(), new_id).await;
        self.finalize_step(shared).await?;
        Ok(new_id)
    }

    /// Post-mutation bookkeeping: snapshot the session, or promote it to
    /// the archive when the reader has reached an ending.
    async fn finalize_step(&self, shared: &SharedSession) -> Result<(), FlowError> {
        let (ended, category) = {
            let guard = shared.read().await;
            (
                guard.current_scene().is_some_and(|s| s.is_ending),
                guard.story.category.clone(),
            )
        };

        if ended {
            self.complete_story(shared).await?;
            self.archive.delete_in_progress(&category)?;
        } else {
            let guard = shared.read().await;
            self.archive.save_in_progress(&category, &guard)?;
        }
        Ok(())
    }

    async fn complete_story(&self, shared: &SharedSession) -> Result<StoryId, FlowError> {
        let story_id = {
            let guard = shared.read().await;
            self.archive.save_completed(&guard)?
        };
        self.spawn_cover_art(shared.clone(), story_id);
        Ok(story_id)
    }

    /// Cover art for a freshly archived story, written onto the archive
    /// record as it progresses. Failures stay on the record.
    fn spawn_cover_art(&self, shared: SharedSession, story_id: StoryId) {
        let media = self.media.clone();
        let archive = self.archive.clone();
        tokio::spawn(async move {
            let (provider_key, prompt) = {
                let guard = shared.read().await;
                let prompt = format!(
                    "Book cover illustration for a story titled \"{}\": {}",
                    guard.story.title, guard.story.prompt
                );
                (guard.story.image_provider.clone(), prompt)
            };

            update_cover(&*archive, story_id, |record| {
                record.cover_art_status = fableforge_domain::CoverArtStatus::Generating;
            });

            match media.generate_cover(&provider_key, story_id, &prompt).await {
                Ok(url) => update_cover(&*archive, story_id, |record| {
                    record.cover_art_status = fableforge_domain::CoverArtStatus::Complete;
                    record.cover_art_url = Some(url.clone());
                }),
                Err(e) => {
                    tracing::warn!(%story_id, error = %e, "Cover art generation failed");
                    update_cover(&*archive, story_id, |record| {
                        record.cover_art_status = fableforge_domain::CoverArtStatus::Failed;
                    });
                }
            }
        });
    }
}

fn chapters_for(story: &Story, depth: u32) -> ChapterPlacement {
    ChapterPlacement {
        chapter_number: story.chapter_for_depth(depth),
        total_chapters: story.total_chapters(),
        is_chapter_start: story.is_chapter_start(depth),
    }
}

/// Best-effort archive record mutation; cover art state is cosmetic.
fn update_cover(
    archive: &dyn ArchivePort,
    story_id: StoryId,
    mutate: impl FnOnce(&mut fableforge_domain::SavedStory),
) {
    let record = match archive.load_completed(story_id) {
        Ok(Some(record)) => record,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(%story_id, error = %e, "Could not load story for cover update");
            return;
        }
    };
    let mut record = record;
    mutate(&mut record);
    if let Err(e) = archive.update_completed(&record) {
        tracing::warn!(%story_id, error = %e, "Could not persist cover update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{
        ChatMessage, ImageGenPort, VideoGenPort, VideoJobId, VideoPoll,
    };
    use crate::media::orchestrator::MediaConfig;
    use crate::media::store::MediaStore;
    use crate::stores::archive::FileArchive;
    use crate::stores::session_store::InMemorySessionStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Text port that always proposes a non-ending scene with 3 choices;
    /// endings only happen when the pipeline forces them.
    struct EagerStoryteller {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TextGenPort for EagerStoryteller {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!(
                r#"{{"title": "Scene {n}", "content": "Narrative {n}.", "image_prompt": "art {n}", "is_ending": false, "choices": [{{"text": "left {n}"}}, {{"text": "right {n}"}}, {{"text": "onward {n}"}}]}}"#
            ))
        }
    }

    struct BrokenText;

    #[async_trait]
    impl TextGenPort for BrokenText {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            Err(ProviderError::ContentRefused("no".into()))
        }
    }

    struct OkImage;

    #[async_trait]
    impl ImageGenPort for OkImage {
        async fn generate(
            &self,
            _prompt: &str,
            _reference_images: &[PathBuf],
        ) -> Result<Vec<u8>, ProviderError> {
            Ok(b"png".to_vec())
        }
    }

    struct NoVideo;

    #[async_trait]
    impl VideoGenPort for NoVideo {
        async fn submit(
            &self,
            _prompt: &str,
            _first_frame: Option<&Path>,
        ) -> Result<VideoJobId, ProviderError> {
            Err(ProviderError::Unavailable("grok-imagine-video"))
        }

        async fn poll(&self, _job: &VideoJobId) -> Result<VideoPoll, ProviderError> {
            Ok(VideoPoll::Pending)
        }
    }

    struct TestResolver {
        text: Arc<dyn TextGenPort>,
        text_calls: Arc<AtomicU32>,
    }

    impl ProviderResolver for TestResolver {
        fn text(&self, _id: TextProviderId) -> Result<Arc<dyn TextGenPort>, ProviderError> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }

        fn image(
            &self,
            _id: crate::infrastructure::registry::ImageProviderId,
        ) -> Result<Arc<dyn ImageGenPort>, ProviderError> {
            Ok(Arc::new(OkImage))
        }

        fn video(&self) -> Result<Arc<dyn VideoGenPort>, ProviderError> {
            Ok(Arc::new(NoVideo))
        }

        fn fast_image_provider(
            &self,
            story_provider: crate::infrastructure::registry::ImageProviderId,
        ) -> crate::infrastructure::registry::ImageProviderId {
            story_provider
        }
    }

    struct Harness {
        flow: StoryFlow,
        archive: Arc<FileArchive>,
        text_calls: Arc<AtomicU32>,
        _dir: TempDir,
    }

    fn harness(text: Arc<dyn TextGenPort>) -> Harness {
        let dir = TempDir::new().unwrap();
        let text_calls = Arc::new(AtomicU32::new(0));
        let resolver = Arc::new(TestResolver {
            text,
            text_calls: text_calls.clone(),
        });
        let archive = Arc::new(FileArchive::new(dir.path().join("data")));
        let media = MediaOrchestrator::new(
            resolver.clone(),
            Arc::new(MediaStore::new(dir.path().join("media"))),
        )
        .with_config(MediaConfig {
            base_delay_ms: 1,
            max_delay_ms: 2,
            chain_poll_ms: 1,
            chain_max_wait_ms: 5,
            ..MediaConfig::default()
        });
        let flow = StoryFlow::new(
            resolver,
            ScenePipeline::new(50_000),
            media,
            Arc::new(InMemorySessionStore::new()),
            archive.clone(),
        );
        Harness {
            flow,
            archive,
            text_calls,
            _dir: dir,
        }
    }

    fn params() -> NewStoryParams {
        NewStoryParams {
            title: "The Lighthouse".into(),
            prompt: "a haunted lighthouse".into(),
            length: StoryLength::Short,
            category: "default".into(),
            text_provider: "claude".into(),
            image_provider: "gpt-image-1".into(),
            video_mode: false,
            bedtime_mode: false,
            art_style: String::new(),
            protagonist_age: String::new(),
            character_name: String::new(),
            character_description: String::new(),
            reference_photo_paths: vec![],
            character_photo_paths: vec![],
            parent_story_id: None,
        }
    }

    #[tokio::test]
    async fn short_story_walkthrough_reaches_a_forced_ending() {
        let h = harness(Arc::new(EagerStoryteller {
            calls: AtomicU32::new(0),
        }));

        // Depth 0: opening scene, still developing.
        let (session_id, shared) = h.flow.start_story(params()).await.unwrap();
        let (root_id, first_choice) = {
            let guard = shared.read().await;
            let scene = guard.current_scene().unwrap();
            assert_eq!(scene.depth, 0);
            assert!(!scene.is_ending);
            assert_eq!(scene.choices.len(), 3);
            (scene.scene_id, scene.choices[0].choice_id)
        };
        assert!(h.archive.load_in_progress("default").unwrap().is_some());

        // Depth 1: wrap-up territory, still not an ending (the mock never
        // volunteers one).
        let mid_id = h.flow.choose(session_id, root_id, first_choice).await.unwrap();
        let mid_choice = {
            let guard = shared.read().await;
            let scene = guard.current_scene().unwrap();
            assert_eq!(scene.scene_id, mid_id);
            assert_eq!(scene.depth, 1);
            assert!(!scene.is_ending);
            scene.choices[1].choice_id
        };

        // Depth 2: remaining budget is 1, so the pipeline forces a finale.
        let end_id = h.flow.choose(session_id, mid_id, mid_choice).await.unwrap();
        {
            let guard = shared.read().await;
            let scene = guard.current_scene().unwrap();
            assert_eq!(scene.scene_id, end_id);
            assert_eq!(scene.depth, 2);
            assert!(scene.is_ending);
            assert!(scene.choices.is_empty());
            // Memoized edge recorded on the parent.
            let parent = guard.scene(mid_id).unwrap();
            assert_eq!(parent.find_choice(mid_choice).unwrap().next_scene_id, Some(end_id));
        }

        // The ending promoted the session and released the progress slot.
        assert!(h.archive.load_in_progress("default").unwrap().is_none());
        let archived = h.archive.load_completed({
            shared.read().await.story.story_id
        }).unwrap().unwrap();
        assert_eq!(archived.path_history, shared.read().await.path_history);
    }

    #[tokio::test]
    async fn rechoosing_an_explored_branch_skips_generation() {
        let h = harness(Arc::new(EagerStoryteller {
            calls: AtomicU32::new(0),
        }));

        let (session_id, shared) = h.flow.start_story(params()).await.unwrap();
        let (root_id, choice_id) = {
            let guard = shared.read().await;
            let scene = guard.current_scene().unwrap();
            (scene.scene_id, scene.choices[0].choice_id)
        };

        let first = h.flow.choose(session_id, root_id, choice_id).await.unwrap();
        let calls_after_first = h.text_calls.load(Ordering::SeqCst);

        h.flow.go_back(session_id).await.unwrap();
        let second = h.flow.choose(session_id, root_id, choice_id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.text_calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(shared.read().await.scenes.len(), 2);
    }

    #[tokio::test]
    async fn text_failure_leaves_the_tree_untouched() {
        let h = harness(Arc::new(EagerStoryteller {
            calls: AtomicU32::new(0),
        }));
        let (session_id, shared) = h.flow.start_story(params()).await.unwrap();
        let (root_id, choice_id) = {
            let guard = shared.read().await;
            let scene = guard.current_scene().unwrap();
            (scene.scene_id, scene.choices[0].choice_id)
        };

        // Same session store, now behind a provider that refuses mid-story.
        let failing_flow = StoryFlow::new(
            Arc::new(TestResolver {
                text: Arc::new(BrokenText),
                text_calls: Arc::new(AtomicU32::new(0)),
            }),
            ScenePipeline::new(50_000),
            h.flow.media.clone(),
            h.flow.sessions.clone(),
            h.flow.archive.clone(),
        );
        let err = failing_flow.choose(session_id, root_id, choice_id).await.unwrap_err();
        assert!(matches!(err, FlowError::Generation(_)));

        let guard = shared.read().await;
        assert_eq!(guard.scenes.len(), 1);
        assert_eq!(guard.path_history, vec![root_id]);
        assert!(guard.scene(root_id).unwrap().find_choice(choice_id).unwrap().next_scene_id.is_none());
    }

    #[tokio::test]
    async fn custom_choice_branches_off_the_scene() {
        let h = harness(Arc::new(EagerStoryteller {
            calls: AtomicU32::new(0),
        }));
        let (session_id, shared) = h.flow.start_story(params()).await.unwrap();
        let root_id = shared.read().await.current_scene().unwrap().scene_id;

        let new_id = h
            .flow
            .custom_choice(session_id, root_id, "dig under the lighthouse".into())
            .await
            .unwrap();

        let guard = shared.read().await;
        let root = guard.scene(root_id).unwrap();
        assert_eq!(root.choices.len(), 4);
        let custom = root.choices.last().unwrap();
        assert_eq!(custom.text, "dig under the lighthouse");
        assert_eq!(custom.next_scene_id, Some(new_id));
        assert_eq!(guard.scene(new_id).unwrap().choice_taken_id, Some(custom.choice_id));
    }

    #[tokio::test]
    async fn resume_restores_the_progress_slot() {
        let h = harness(Arc::new(EagerStoryteller {
            calls: AtomicU32::new(0),
        }));
        let (_, shared) = h.flow.start_story(params()).await.unwrap();
        let story_id = shared.read().await.story.story_id;

        // A later process: same archive, fresh session registry.
        let later = StoryFlow::new(
            h.flow.resolver.clone(),
            ScenePipeline::new(50_000),
            h.flow.media.clone(),
            Arc::new(InMemorySessionStore::new()),
            h.flow.archive.clone(),
        );
        let (resumed_id, resumed) = later.resume("default").unwrap().expect("slot present");
        assert_eq!(resumed.read().await.story.story_id, story_id);

        later.abandon(resumed_id).await.unwrap();
        assert!(later.resume("default").unwrap().is_none());
        assert!(matches!(
            later.recap(resumed_id).await.unwrap_err(),
            FlowError::SessionNotFound(_)
        ));
    }

    #[tokio::test]
    async fn recap_is_cached_per_path_prefix() {
        let h = harness(Arc::new(EagerStoryteller {
            calls: AtomicU32::new(0),
        }));
        let (session_id, _shared) = h.flow.start_story(params()).await.unwrap();
        let calls_before = h.text_calls.load(Ordering::SeqCst);

        let first = h.flow.recap(session_id).await.unwrap();
        let after_first = h.text_calls.load(Ordering::SeqCst);
        assert!(after_first > calls_before);
        assert!(!first.is_empty());

        let second = h.flow.recap(session_id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.text_calls.load(Ordering::SeqCst), after_first);
    }
}
