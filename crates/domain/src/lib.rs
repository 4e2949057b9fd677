//! Fableforge domain layer.
//!
//! Pure types and invariants for the branching story tree: scenes,
//! choices, illustration state, live sessions, and frozen completed
//! stories. No IO, no providers - those live in `fableforge-engine`.

pub mod entities;
pub mod error;
pub mod ids;

pub use entities::{
    build_tree, Choice, CoverArtStatus, Image, ImageStatus, SavedChoice, SavedScene, SavedStory,
    Scene, Story, StoryLength, StorySession, TreeNode, VideoStatus, SCENES_PER_CHAPTER,
};
pub use error::DomainError;
pub use ids::{ChoiceId, SceneId, SessionId, StoryId};
