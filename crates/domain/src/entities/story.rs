//! Story aggregate root - immutable creation parameters plus the reader's
//! current position.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SceneId, StoryId};

/// Number of scenes per chapter in epic-length stories.
pub const SCENES_PER_CHAPTER: u32 = 5;

/// Target narrative length, expressed as a tree depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryLength {
    Short,
    Medium,
    Long,
    Epic,
}

impl StoryLength {
    pub fn target_depth(self) -> u32 {
        match self {
            Self::Short => 3,
            Self::Medium => 5,
            Self::Long => 7,
            Self::Epic => 25,
        }
    }

    /// Epic stories carry a chapter structure on top of the scene tree.
    pub fn is_chaptered(self) -> bool {
        matches!(self, Self::Epic)
    }
}

impl std::fmt::Display for StoryLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Short => write!(f, "short"),
            Self::Medium => write!(f, "medium"),
            Self::Long => write!(f, "long"),
            Self::Epic => write!(f, "epic"),
        }
    }
}

impl std::str::FromStr for StoryLength {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            "epic" => Ok(Self::Epic),
            _ => Err(()),
        }
    }
}

/// Creation parameters for one story, frozen at start time except for
/// `current_scene_id` (the reader's cursor) and `rolling_reference_path`
/// (updated by the media orchestrator as scene images complete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub story_id: StoryId,
    pub title: String,
    pub prompt: String,
    pub length: StoryLength,
    pub target_depth: u32,
    /// Category key for the one-slot in-progress save.
    pub category: String,
    /// Registry key of the text provider.
    pub text_provider: String,
    /// Registry key of the image provider.
    pub image_provider: String,
    pub video_mode: bool,
    pub bedtime_mode: bool,
    #[serde(default)]
    pub art_style: String,
    #[serde(default)]
    pub protagonist_age: String,
    #[serde(default)]
    pub character_name: String,
    #[serde(default)]
    pub character_description: String,
    /// Direct reference photo uploads - highest priority for image editing.
    #[serde(default)]
    pub reference_photo_paths: Vec<PathBuf>,
    /// Photos of recurring cast characters, used when there are no uploads.
    #[serde(default)]
    pub character_photo_paths: Vec<PathBuf>,
    /// Most recently generated scene image, reused for visual continuity.
    #[serde(default)]
    pub rolling_reference_path: Option<PathBuf>,
    /// Set when this story is a sequel to a completed one.
    pub parent_story_id: Option<StoryId>,
    pub created_at: DateTime<Utc>,
    pub current_scene_id: SceneId,
}

impl Story {
    /// Chapter number for a scene depth, for chaptered lengths only.
    pub fn chapter_for_depth(&self, depth: u32) -> Option<u32> {
        self.length
            .is_chaptered()
            .then(|| depth / SCENES_PER_CHAPTER + 1)
    }

    /// Whether a scene at `depth` opens a new chapter.
    pub fn is_chapter_start(&self, depth: u32) -> bool {
        self.length.is_chaptered() && depth % SCENES_PER_CHAPTER == 0
    }

    pub fn total_chapters(&self) -> Option<u32> {
        self.length
            .is_chaptered()
            .then(|| self.target_depth.div_ceil(SCENES_PER_CHAPTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_depths() {
        assert_eq!(StoryLength::Short.target_depth(), 3);
        assert_eq!(StoryLength::Medium.target_depth(), 5);
        assert_eq!(StoryLength::Long.target_depth(), 7);
        assert_eq!(StoryLength::Epic.target_depth(), 25);
    }

    #[test]
    fn parses_from_str() {
        assert_eq!("Epic".parse::<StoryLength>(), Ok(StoryLength::Epic));
        assert!("sonnet".parse::<StoryLength>().is_err());
    }
}
