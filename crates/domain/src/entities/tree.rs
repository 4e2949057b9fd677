//! Nested tree projection of an explored session, for map-style displays.

use std::collections::HashMap;

use serde::Serialize;

use crate::entities::session::StorySession;
use crate::ids::SceneId;

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub id: SceneId,
    pub label: String,
    pub is_ending: bool,
    pub is_current: bool,
    pub on_path: bool,
    /// Text of the choice on the parent that led here, when known.
    pub choice_text: String,
    pub children: Vec<TreeNode>,
}

/// Convert the flat scene map into a nested tree rooted at the scene with
/// no parent. Returns `None` for a session with no scenes.
pub fn build_tree(session: &StorySession) -> Option<TreeNode> {
    let mut children_map: HashMap<Option<SceneId>, Vec<SceneId>> = HashMap::new();
    for (id, scene) in &session.scenes {
        children_map.entry(scene.parent_scene_id).or_default().push(*id);
    }

    let root = *children_map.get(&None)?.first()?;
    let on_path: std::collections::HashSet<SceneId> =
        session.path_history.iter().copied().collect();

    fn build_node(
        session: &StorySession,
        children_map: &HashMap<Option<SceneId>, Vec<SceneId>>,
        on_path: &std::collections::HashSet<SceneId>,
        id: SceneId,
    ) -> TreeNode {
        let scene = &session.scenes[&id];

        let choice_text = scene
            .parent_scene_id
            .zip(scene.choice_taken_id)
            .and_then(|(pid, cid)| session.scenes.get(&pid)?.find_choice(cid))
            .map(|c| c.text.clone())
            .unwrap_or_default();

        let mut children: Vec<TreeNode> = children_map
            .get(&Some(id))
            .into_iter()
            .flatten()
            .map(|child| build_node(session, children_map, on_path, *child))
            .collect();
        // Stable ordering for rendering
        children.sort_by_key(|c| c.id.to_string());

        TreeNode {
            id,
            label: format!("Ch. {}", scene.depth + 1),
            is_ending: scene.is_ending,
            is_current: id == session.story.current_scene_id,
            on_path: on_path.contains(&id),
            choice_text,
            children,
        }
    }

    Some(build_node(session, &children_map, &on_path, root))
}
