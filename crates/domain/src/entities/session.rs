//! Live session state: the full explored scene tree plus the active path.
//!
//! `scenes` holds every scene the reader has ever generated, including side
//! branches left behind by back-navigation. `path_history` is the active
//! root-to-current chain only; the two are deliberately distinct.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entities::scene::Scene;
use crate::entities::story::Story;
use crate::error::DomainError;
use crate::ids::SceneId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorySession {
    pub story: Story,
    pub scenes: HashMap<SceneId, Scene>,
    pub path_history: Vec<SceneId>,
    /// Recap text keyed by a path-prefix signature, so revisiting the same
    /// point never pays for a second provider call.
    #[serde(default)]
    pub recap_cache: HashMap<String, String>,
}

impl StorySession {
    /// Create a session positioned at `initial_scene`.
    pub fn start(mut story: Story, initial_scene: Scene) -> Self {
        let scene_id = initial_scene.scene_id;
        story.current_scene_id = scene_id;
        let mut scenes = HashMap::new();
        scenes.insert(scene_id, initial_scene);
        Self {
            story,
            scenes,
            path_history: vec![scene_id],
            recap_cache: HashMap::new(),
        }
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.path_history
            .last()
            .and_then(|id| self.scenes.get(id))
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(&id)
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.get_mut(&id)
    }

    /// Attach a freshly generated scene and move the cursor onto it.
    pub fn advance(&mut self, scene: Scene) {
        let id = scene.scene_id;
        self.scenes.insert(id, scene);
        self.path_history.push(id);
        self.story.current_scene_id = id;
    }

    /// Step back one scene along the active path.
    ///
    /// At the root this is a no-op: no mutation, `None` returned. The
    /// reader cannot navigate past the beginning.
    pub fn go_back(&mut self) -> Option<&Scene> {
        if self.path_history.len() <= 1 {
            return None;
        }
        self.path_history.pop();
        let current = *self.path_history.last()?;
        self.story.current_scene_id = current;
        self.scenes.get(&current)
    }

    /// Jump to any previously explored scene, rebuilding the active path
    /// by walking parent pointers up to the root.
    ///
    /// Fails with `NotFound` (leaving the session untouched) when the id is
    /// not in the tree; there is no partial reconstruction.
    pub fn jump_to(&mut self, scene_id: SceneId) -> Result<&Scene, DomainError> {
        if !self.scenes.contains_key(&scene_id) {
            return Err(DomainError::not_found("Scene", scene_id.to_string()));
        }

        let mut path = Vec::new();
        let mut cursor = Some(scene_id);
        while let Some(id) = cursor {
            path.push(id);
            cursor = self.scenes.get(&id).and_then(|s| s.parent_scene_id);
        }
        path.reverse();

        self.path_history = path;
        self.story.current_scene_id = scene_id;
        Ok(&self.scenes[&scene_id])
    }

    /// The ordered narrative so far: scenes along the active path,
    /// root to current.
    pub fn full_context(&self) -> Vec<&Scene> {
        self.path_history
            .iter()
            .filter_map(|id| self.scenes.get(id))
            .collect()
    }

    /// Cache signature for a recap covering the first `len` path entries.
    pub fn recap_key(&self, len: usize) -> String {
        self.path_history[..len.min(self.path_history.len())]
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn cached_recap(&self, key: &str) -> Option<&str> {
        self.recap_cache.get(key).map(String::as_str)
    }

    pub fn cache_recap(&mut self, key: String, text: String) {
        self.recap_cache.insert(key, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::scene::{Choice, Image};
    use crate::entities::story::StoryLength;
    use crate::ids::StoryId;
    use chrono::Utc;

    fn test_story() -> Story {
        Story {
            story_id: StoryId::new(),
            title: "Test".into(),
            prompt: "a haunted lighthouse".into(),
            length: StoryLength::Short,
            target_depth: 3,
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
            rolling_reference_path: None,
            parent_story_id: None,
            created_at: Utc::now(),
            current_scene_id: SceneId::new(),
        }
    }

    fn scene_with_choices(n: usize) -> Scene {
        let choices = (0..n).map(|i| Choice::new(format!("choice {i}"))).collect();
        Scene::root("once upon a time", Image::new("a lighthouse"), choices, false)
    }

    fn child(session: &StorySession, parent_id: SceneId, choice_idx: usize) -> Scene {
        let parent = session.scene(parent_id).unwrap();
        let choice_id = parent.choices[choice_idx].choice_id;
        Scene::child_of(
            parent,
            choice_id,
            "and then",
            Image::new("deeper in"),
            vec![Choice::new("a"), Choice::new("b")],
            false,
        )
    }

    fn assert_invariants(session: &StorySession) {
        // Every path id exists in the scene map.
        for id in &session.path_history {
            assert!(session.scenes.contains_key(id), "path id missing from tree");
        }
        // Consecutive path entries are parent-linked, depths step by one.
        for pair in session.path_history.windows(2) {
            let parent = &session.scenes[&pair[0]];
            let next = &session.scenes[&pair[1]];
            assert_eq!(next.parent_scene_id, Some(parent.scene_id));
            assert_eq!(next.depth, parent.depth + 1);
        }
        // Root depth is 0.
        let root = &session.scenes[&session.path_history[0]];
        assert_eq!(root.depth, 0);
    }

    #[test]
    fn start_sets_single_entry_path() {
        let session = StorySession::start(test_story(), scene_with_choices(3));
        assert_eq!(session.path_history.len(), 1);
        assert_eq!(
            session.story.current_scene_id,
            session.path_history[0]
        );
        assert_invariants(&session);
    }

    #[test]
    fn advance_extends_path_and_cursor() {
        let mut session = StorySession::start(test_story(), scene_with_choices(3));
        let root_id = session.path_history[0];
        let next = child(&session, root_id, 0);
        let next_id = next.scene_id;

        session.advance(next);

        assert_eq!(session.path_history, vec![root_id, next_id]);
        assert_eq!(session.story.current_scene_id, next_id);
        assert_invariants(&session);
    }

    #[test]
    fn go_back_at_root_is_a_noop() {
        let mut session = StorySession::start(test_story(), scene_with_choices(3));
        let before = session.path_history.clone();

        assert!(session.go_back().is_none());
        assert_eq!(session.path_history, before);
    }

    #[test]
    fn go_back_pops_and_returns_new_current() {
        let mut session = StorySession::start(test_story(), scene_with_choices(3));
        let root_id = session.path_history[0];
        session.advance(child(&session, root_id, 0));

        let current = session.go_back().expect("should step back").scene_id;
        assert_eq!(current, root_id);
        assert_eq!(session.story.current_scene_id, root_id);
        assert_eq!(session.path_history, vec![root_id]);
    }

    #[test]
    fn jump_to_rebuilds_path_across_branches() {
        let mut session = StorySession::start(test_story(), scene_with_choices(3));
        let root_id = session.path_history[0];

        // Explore branch A two deep.
        let a1 = child(&session, root_id, 0);
        let a1_id = a1.scene_id;
        session.advance(a1);
        let a2 = child(&session, a1_id, 0);
        let a2_id = a2.scene_id;
        session.advance(a2);

        // Back to root, take branch B.
        session.go_back();
        session.go_back();
        let b1 = child(&session, root_id, 1);
        let b1_id = b1.scene_id;
        session.advance(b1);

        // Jump back to the tip of branch A, off the current path.
        let landed = session.jump_to(a2_id).expect("scene is in the tree");
        assert_eq!(landed.scene_id, a2_id);
        assert_eq!(session.path_history, vec![root_id, a1_id, a2_id]);
        assert_invariants(&session);

        // The side branch is still in the tree.
        assert!(session.scenes.contains_key(&b1_id));

        // full_context follows the rebuilt path exactly, in order.
        let ctx: Vec<SceneId> = session.full_context().iter().map(|s| s.scene_id).collect();
        assert_eq!(ctx, vec![root_id, a1_id, a2_id]);
    }

    #[test]
    fn jump_to_unknown_scene_fails_without_mutation() {
        let mut session = StorySession::start(test_story(), scene_with_choices(3));
        let before = session.path_history.clone();

        let err = session.jump_to(SceneId::new()).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert_eq!(session.path_history, before);
    }

    #[test]
    fn recap_cache_round_trip() {
        let mut session = StorySession::start(test_story(), scene_with_choices(3));
        let key = session.recap_key(1);
        assert!(session.cached_recap(&key).is_none());
        session.cache_recap(key.clone(), "Our hero set out.".into());
        assert_eq!(session.cached_recap(&key), Some("Our hero set out."));
    }
}
