pub mod saved_story;
pub mod scene;
pub mod session;
pub mod story;
pub mod tree;

pub use saved_story::{CoverArtStatus, SavedChoice, SavedScene, SavedStory};
pub use scene::{Choice, Image, ImageStatus, Scene, VideoStatus};
pub use session::StorySession;
pub use story::{Story, StoryLength, SCENES_PER_CHAPTER};
pub use tree::{build_tree, TreeNode};
