//! Frozen projection of a completed story.
//!
//! Once a reader reaches an ending the live session is promoted to a
//! `SavedStory`: scenes frozen, media URLs denormalized, no further
//! mutation except cover art status and sequel forward references.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::scene::ImageStatus;
use crate::entities::session::StorySession;
use crate::ids::{ChoiceId, SceneId, StoryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverArtStatus {
    None,
    Generating,
    Complete,
    Failed,
}

impl Default for CoverArtStatus {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedChoice {
    pub choice_id: ChoiceId,
    pub text: String,
    pub next_scene_id: Option<SceneId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedScene {
    pub scene_id: SceneId,
    pub parent_scene_id: Option<SceneId>,
    pub choice_taken_id: Option<ChoiceId>,
    pub content: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_prompt: String,
    pub video_url: Option<String>,
    #[serde(default)]
    pub extra_image_urls: Vec<String>,
    #[serde(default)]
    pub extra_image_prompts: Vec<String>,
    #[serde(default)]
    pub choices: Vec<SavedChoice>,
    pub is_ending: bool,
    pub depth: u32,
    pub chapter_number: Option<u32>,
    pub chapter_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedStory {
    pub story_id: StoryId,
    pub title: String,
    pub prompt: String,
    pub category: String,
    pub length: String,
    pub target_depth: u32,
    pub text_provider: String,
    pub image_provider: String,
    pub video_mode: bool,
    pub bedtime_mode: bool,
    #[serde(default)]
    pub art_style: String,
    #[serde(default)]
    pub character_name: String,
    #[serde(default)]
    pub character_description: String,
    pub parent_story_id: Option<StoryId>,
    /// Forward references, appended by each sequel's completion.
    #[serde(default)]
    pub sequel_story_ids: Vec<StoryId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub cover_art_url: Option<String>,
    #[serde(default)]
    pub cover_art_status: CoverArtStatus,
    pub scenes: HashMap<SceneId, SavedScene>,
    pub path_history: Vec<SceneId>,
}

impl SavedStory {
    /// Freeze a live session. Only extra images that actually completed
    /// are carried over; in-flight or failed ones are dropped.
    pub fn from_session(session: &StorySession, completed_at: DateTime<Utc>) -> Self {
        let story = &session.story;

        let scenes = session
            .scenes
            .iter()
            .map(|(id, scene)| {
                let (extra_urls, extra_prompts): (Vec<_>, Vec<_>) = scene
                    .extra_images
                    .iter()
                    .filter(|ei| ei.status == ImageStatus::Complete && ei.url.is_some())
                    .map(|ei| (ei.url.clone().unwrap_or_default(), ei.prompt.clone()))
                    .unzip();

                let saved = SavedScene {
                    scene_id: scene.scene_id,
                    parent_scene_id: scene.parent_scene_id,
                    choice_taken_id: scene.choice_taken_id,
                    content: scene.content.clone(),
                    image_url: scene.image.url.clone(),
                    image_prompt: scene.image.prompt.clone(),
                    video_url: scene.image.video_url.clone(),
                    extra_image_urls: extra_urls,
                    extra_image_prompts: extra_prompts,
                    choices: scene
                        .choices
                        .iter()
                        .map(|c| SavedChoice {
                            choice_id: c.choice_id,
                            text: c.text.clone(),
                            next_scene_id: c.next_scene_id,
                        })
                        .collect(),
                    is_ending: scene.is_ending,
                    depth: scene.depth,
                    chapter_number: scene.chapter_number,
                    chapter_title: scene.chapter_title.clone(),
                };
                (*id, saved)
            })
            .collect();

        Self {
            story_id: story.story_id,
            title: story.title.clone(),
            prompt: story.prompt.clone(),
            category: story.category.clone(),
            length: story.length.to_string(),
            target_depth: story.target_depth,
            text_provider: story.text_provider.clone(),
            image_provider: story.image_provider.clone(),
            video_mode: story.video_mode,
            bedtime_mode: story.bedtime_mode,
            art_style: story.art_style.clone(),
            character_name: story.character_name.clone(),
            character_description: story.character_description.clone(),
            parent_story_id: story.parent_story_id,
            sequel_story_ids: Vec::new(),
            created_at: story.created_at,
            completed_at,
            cover_art_url: None,
            cover_art_status: CoverArtStatus::None,
            scenes,
            path_history: session.path_history.clone(),
        }
    }
}
