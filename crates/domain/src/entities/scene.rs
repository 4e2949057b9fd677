//! Scene entity - one generated narrative unit with illustration and choices.
//!
//! Scenes form a tree: children hold a back-reference to their parent
//! (`parent_scene_id`), never the other way around. Depth is fixed at
//! construction so the root-is-0 / child-is-parent+1 invariant cannot drift.

use serde::{Deserialize, Serialize};

use crate::ids::{ChoiceId, SceneId};

/// Lifecycle of one illustration generation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Pending,
    Generating,
    Complete,
    Failed,
}

impl ImageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Video sub-state, independent of the still image's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    None,
    Pending,
    Generating,
    Complete,
    Failed,
}

impl Default for VideoStatus {
    fn default() -> Self {
        Self::None
    }
}

/// An illustration slot owned by a scene.
///
/// The URL is non-null exactly when status is Complete; the transition
/// methods are the only mutation path, so the invariant holds by
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub prompt: String,
    pub status: ImageStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub video_status: VideoStatus,
    pub video_url: Option<String>,
    pub video_error: Option<String>,
}

impl Image {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            status: ImageStatus::Pending,
            url: None,
            error: None,
            video_status: VideoStatus::None,
            video_url: None,
            video_error: None,
        }
    }

    pub fn mark_generating(&mut self) {
        self.status = ImageStatus::Generating;
    }

    pub fn complete(&mut self, url: impl Into<String>) {
        self.status = ImageStatus::Complete;
        self.url = Some(url.into());
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ImageStatus::Failed;
        self.url = None;
        self.error = Some(error.into());
    }

    /// Reset for a user-triggered retry. No-op while a unit is running;
    /// the orchestrator checks for Generating before calling this.
    pub fn reset_for_retry(&mut self) {
        self.status = ImageStatus::Pending;
        self.url = None;
        self.error = None;
    }

    pub fn mark_video_generating(&mut self) {
        self.video_status = VideoStatus::Generating;
    }

    pub fn complete_video(&mut self, url: impl Into<String>) {
        self.video_status = VideoStatus::Complete;
        self.video_url = Some(url.into());
        self.video_error = None;
    }

    pub fn fail_video(&mut self, error: impl Into<String>) {
        self.video_status = VideoStatus::Failed;
        self.video_url = None;
        self.video_error = Some(error.into());
    }

    pub fn reset_video_for_retry(&mut self) {
        self.video_status = VideoStatus::Pending;
        self.video_url = None;
        self.video_error = None;
    }
}

/// One outgoing edge from a scene.
///
/// `next_scene_id` is set only once a reader has taken the choice and the
/// resulting scene exists - a memoized edge that prevents regenerating the
/// same branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub choice_id: ChoiceId,
    pub text: String,
    pub next_scene_id: Option<SceneId>,
}

impl Choice {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            choice_id: ChoiceId::new(),
            text: text.into(),
            next_scene_id: None,
        }
    }
}

/// One generated narrative unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: SceneId,
    /// Back-reference only; children do not own their parents.
    pub parent_scene_id: Option<SceneId>,
    /// The choice on the parent that led here.
    pub choice_taken_id: Option<ChoiceId>,
    pub content: String,
    pub image: Image,
    /// Picture-book mode extras, independent generation units.
    #[serde(default)]
    pub extra_images: Vec<Image>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub is_ending: bool,
    pub depth: u32,
    pub chapter_number: Option<u32>,
    pub chapter_title: Option<String>,
}

impl Scene {
    /// Create the root scene of a story (depth 0).
    pub fn root(content: impl Into<String>, image: Image, choices: Vec<Choice>, is_ending: bool) -> Self {
        Self {
            scene_id: SceneId::new(),
            parent_scene_id: None,
            choice_taken_id: None,
            content: content.into(),
            image,
            extra_images: Vec::new(),
            choices: if is_ending { Vec::new() } else { choices },
            is_ending,
            depth: 0,
            chapter_number: None,
            chapter_title: None,
        }
    }

    /// Create a child scene reached via `choice_id` on `parent`.
    /// Depth is derived from the parent, enforcing the depth invariant.
    pub fn child_of(
        parent: &Scene,
        choice_id: ChoiceId,
        content: impl Into<String>,
        image: Image,
        choices: Vec<Choice>,
        is_ending: bool,
    ) -> Self {
        Self {
            scene_id: SceneId::new(),
            parent_scene_id: Some(parent.scene_id),
            choice_taken_id: Some(choice_id),
            content: content.into(),
            image,
            extra_images: Vec::new(),
            choices: if is_ending { Vec::new() } else { choices },
            is_ending,
            depth: parent.depth + 1,
            chapter_number: None,
            chapter_title: None,
        }
    }

    pub fn find_choice(&self, choice_id: ChoiceId) -> Option<&Choice> {
        self.choices.iter().find(|c| c.choice_id == choice_id)
    }

    pub fn find_choice_mut(&mut self, choice_id: ChoiceId) -> Option<&mut Choice> {
        self.choices.iter_mut().find(|c| c.choice_id == choice_id)
    }
}
