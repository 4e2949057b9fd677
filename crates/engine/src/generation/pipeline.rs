//! Scene generation pipeline: pacing → prompt → provider → typed draft.
//!
//! A pipeline call is a pure function of its inputs; on any failure the
//! caller receives an error and nothing else changes, so no partial scene
//! can reach the tree.

use std::sync::Arc;

use fableforge_domain::{Scene, StoryLength};

use crate::generation::context::ContextBuilder;
use crate::generation::directives::Directives;
use crate::generation::draft::SceneDraft;
use crate::generation::prompts::{
    build_recap_prompt, build_system_prompt, ChapterPlacement, Pacing,
};
use crate::infrastructure::ports::{ChatMessage, GenerationError, TextGenPort};
use crate::infrastructure::resilient::{RetryConfig, RetryingTextClient};

#[derive(Debug)]
pub struct SceneRequest<'a> {
    pub prompt: &'a str,
    pub length: StoryLength,
    /// Prior scenes along the active path, root to current. Empty for the
    /// opening scene.
    pub context_scenes: &'a [Scene],
    pub current_depth: u32,
    pub target_depth: u32,
    /// Literal text of the choice the reader took, for continuations.
    pub choice_text: Option<&'a str>,
    pub directives: &'a Directives,
    pub chapters: ChapterPlacement,
}

pub struct ScenePipeline {
    context: ContextBuilder,
    retry: RetryConfig,
}

impl ScenePipeline {
    pub fn new(char_threshold: usize) -> Self {
        Self {
            context: ContextBuilder::new(char_threshold),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Generate one scene draft through `provider`.
    pub async fn generate_scene(
        &self,
        provider: Arc<dyn TextGenPort>,
        request: SceneRequest<'_>,
    ) -> Result<SceneDraft, GenerationError> {
        let pacing = Pacing::for_depth(request.current_depth, request.target_depth);
        let system = build_system_prompt(
            &request.directives.content_guidelines,
            &request.length.to_string(),
            request.current_depth,
            request.target_depth,
            pacing,
            request.chapters,
        );

        let user_message = if request.context_scenes.is_empty() {
            format!(
                "Create the opening scene for this adventure: {}",
                request.prompt
            )
        } else {
            let mut message = self.context.build(request.prompt, request.context_scenes);
            match request.choice_text {
                Some(choice) => {
                    message.push_str(&format!(
                        "\n\nThe reader chose: \"{choice}\"\n\nGenerate the next scene."
                    ));
                }
                None => message.push_str("\n\nGenerate the next scene."),
            }
            message
        };

        let client = RetryingTextClient::new(provider, self.retry.clone());
        let response = client
            .complete(&system, &[ChatMessage::user(user_message)])
            .await?;

        let mut draft = SceneDraft::parse(&response)?;
        if pacing == Pacing::Finale {
            draft.force_ending();
        }
        if !request.directives.image_style.is_empty() {
            draft.image_prompt =
                format!("{}, {}", draft.image_prompt, request.directives.image_style);
        }
        Ok(draft)
    }

    /// Summarize the story so far in a few sentences, in the story's own
    /// voice. Failures are contained: the recap is cosmetic, so any error
    /// collapses to an empty string.
    pub async fn generate_recap(
        &self,
        provider: Arc<dyn TextGenPort>,
        scenes: &[Scene],
        content_guidelines: &str,
        recap_style: &str,
    ) -> String {
        if scenes.is_empty() {
            return String::new();
        }

        let system = build_recap_prompt(scenes.len(), content_guidelines, recap_style);
        let story_text = scenes
            .iter()
            .enumerate()
            .map(|(i, s)| format!("Scene {}: {}", i + 1, s.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let user_message = format!("Summarize this story so far:\n\n{story_text}");

        let client = RetryingTextClient::new(provider, self.retry.clone());
        match client
            .complete(&system, &[ChatMessage::user(user_message)])
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Recap generation failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::ProviderError;
    use async_trait::async_trait;
    use fableforge_domain::{Choice, Image};
    use std::sync::Mutex;

    /// Mock provider that returns a canned response and records the last
    /// system/user payloads it was handed.
    struct CannedText {
        response: String,
        last_system: Mutex<String>,
        last_user: Mutex<String>,
    }

    impl CannedText {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                last_system: Mutex::new(String::new()),
                last_user: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenPort for CannedText {
        async fn complete(
            &self,
            system: &str,
            messages: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            *self.last_system.lock().unwrap() = system.to_string();
            *self.last_user.lock().unwrap() =
                messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(self.response.clone())
        }
    }

    fn scene_json(choice_count: usize, is_ending: bool) -> String {
        let choices: Vec<String> = (0..choice_count)
            .map(|i| format!("{{\"text\": \"option {i}\"}}"))
            .collect();
        format!(
            r#"{{"title": "T", "content": "A scene.", "image_prompt": "a castle on a hill", "is_ending": {is_ending}, "choices": [{}]}}"#,
            choices.join(", ")
        )
    }

    fn request<'a>(
        context: &'a [Scene],
        current_depth: u32,
        target_depth: u32,
        directives: &'a Directives,
    ) -> SceneRequest<'a> {
        SceneRequest {
            prompt: "a haunted lighthouse",
            length: StoryLength::Short,
            context_scenes: context,
            current_depth,
            target_depth,
            choice_text: None,
            directives,
            chapters: ChapterPlacement::default(),
        }
    }

    #[tokio::test]
    async fn opening_scene_uses_the_prompt_directly() {
        let provider = CannedText::new(&scene_json(3, false));
        let pipeline = ScenePipeline::new(50_000);
        let directives = Directives::default();

        let draft = pipeline
            .generate_scene(provider.clone(), request(&[], 0, 3, &directives))
            .await
            .unwrap();

        assert_eq!(draft.choices.len(), 3);
        let user = provider.last_user.lock().unwrap().clone();
        assert!(user.starts_with("Create the opening scene for this adventure: a haunted lighthouse"));
    }

    #[tokio::test]
    async fn continuation_carries_context_and_choice_text() {
        let provider = CannedText::new(&scene_json(3, false));
        let pipeline = ScenePipeline::new(50_000);
        let directives = Directives::default();

        let root = Scene::root(
            "the beam sweeps the rocks",
            Image::new("art"),
            vec![Choice::new("climb the stairs")],
            false,
        );
        let context = vec![root];

        pipeline
            .generate_scene(
                provider.clone(),
                SceneRequest {
                    choice_text: Some("climb the stairs"),
                    ..request(&context, 1, 3, &directives)
                },
            )
            .await
            .unwrap();

        let user = provider.last_user.lock().unwrap().clone();
        assert!(user.contains("--- Chapter 1 ---\nthe beam sweeps the rocks"));
        assert!(user.contains("The reader chose: \"climb the stairs\""));
        assert!(user.ends_with("Generate the next scene."));
    }

    #[tokio::test]
    async fn final_depth_forces_an_ending_with_no_choices() {
        // The generator misbehaves and returns a non-ending with choices.
        let provider = CannedText::new(&scene_json(3, false));
        let pipeline = ScenePipeline::new(50_000);
        let directives = Directives::default();

        let draft = pipeline
            .generate_scene(provider, request(&[], 2, 3, &directives))
            .await
            .unwrap();

        assert!(draft.is_ending);
        assert!(draft.choices.is_empty());
    }

    #[tokio::test]
    async fn image_style_is_appended_comma_joined() {
        let provider = CannedText::new(&scene_json(2, false));
        let pipeline = ScenePipeline::new(50_000);
        let mut directives = Directives::default();
        directives.append_style("soft watercolor, muted palette");

        let draft = pipeline
            .generate_scene(provider, request(&[], 0, 5, &directives))
            .await
            .unwrap();

        assert_eq!(
            draft.image_prompt,
            "a castle on a hill, soft watercolor, muted palette"
        );
    }

    #[tokio::test]
    async fn guidelines_lead_the_system_prompt() {
        let provider = CannedText::new(&scene_json(3, false));
        let pipeline = ScenePipeline::new(50_000);
        let mut directives = Directives::default();
        directives.append_guidelines("KEEP IT GENTLE");

        pipeline
            .generate_scene(provider.clone(), request(&[], 0, 5, &directives))
            .await
            .unwrap();

        assert!(provider.last_system.lock().unwrap().starts_with("KEEP IT GENTLE"));
    }

    #[tokio::test]
    async fn malformed_response_surfaces_as_generation_failure() {
        let provider = CannedText::new("I would rather write free verse.");
        let pipeline = ScenePipeline::new(50_000);
        let directives = Directives::default();

        let err = pipeline
            .generate_scene(provider, request(&[], 0, 5, &directives))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn recap_failure_collapses_to_empty_string() {
        struct AlwaysFails;

        #[async_trait]
        impl TextGenPort for AlwaysFails {
            async fn complete(
                &self,
                _system: &str,
                _messages: &[ChatMessage],
            ) -> Result<String, ProviderError> {
                Err(ProviderError::Transient("down".into()))
            }
        }

        let pipeline = ScenePipeline::new(50_000).with_retry(RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
        });
        let scenes = vec![Scene::root("once", Image::new("a"), vec![], true)];

        let recap = pipeline
            .generate_recap(Arc::new(AlwaysFails), &scenes, "", "")
            .await;
        assert!(recap.is_empty());
    }
}
