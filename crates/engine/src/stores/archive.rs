//! Persistence gateway: whole-object JSON snapshots on the filesystem.
//!
//! Two record kinds: one in-progress slot per category (overwritten on
//! every snapshot) and one immutable-ish record per completed story.
//! Writes go through a sibling temp file and a rename, so a crash mid-
//! write never leaves a half-written record behind.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fableforge_domain::{SavedStory, StoryId, StorySession};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait ArchivePort: Send + Sync {
    /// Snapshot a live session into its category's single progress slot.
    fn save_in_progress(&self, category: &str, session: &StorySession) -> Result<(), ArchiveError>;
    fn load_in_progress(&self, category: &str) -> Result<Option<StorySession>, ArchiveError>;
    fn delete_in_progress(&self, category: &str) -> Result<(), ArchiveError>;

    /// Freeze a finished session into a completed-story record. When the
    /// story is a sequel, the parent record gains a forward reference.
    fn save_completed(&self, session: &StorySession) -> Result<StoryId, ArchiveError>;
    fn load_completed(&self, id: StoryId) -> Result<Option<SavedStory>, ArchiveError>;
    fn update_completed(&self, story: &SavedStory) -> Result<(), ArchiveError>;
    fn link_sequel(&self, parent: StoryId, child: StoryId) -> Result<(), ArchiveError>;
    fn list_completed(&self) -> Result<Vec<SavedStory>, ArchiveError>;
}

#[derive(Debug, Clone)]
pub struct FileArchive {
    stories_dir: PathBuf,
    progress_dir: PathBuf,
}

impl FileArchive {
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        let root = data_root.as_ref();
        Self {
            stories_dir: root.join("stories"),
            progress_dir: root.join("progress"),
        }
    }

    fn progress_path(&self, category: &str) -> PathBuf {
        self.progress_dir
            .join(format!("{}.json", sanitize_category(category)))
    }

    fn story_path(&self, id: StoryId) -> PathBuf {
        self.stories_dir.join(format!("{id}.json"))
    }

    fn write_atomic<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<(), ArchiveError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ArchivePort for FileArchive {
    fn save_in_progress(&self, category: &str, session: &StorySession) -> Result<(), ArchiveError> {
        self.write_atomic(&self.progress_path(category), session)
    }

    fn load_in_progress(&self, category: &str) -> Result<Option<StorySession>, ArchiveError> {
        let path = self.progress_path(category);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&json) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // A corrupted snapshot is unrecoverable; clear the slot so
                // the category can start fresh.
                tracing::warn!(category, error = %e, "Corrupted progress snapshot; deleting");
                fs::remove_file(&path)?;
                Ok(None)
            }
        }
    }

    fn delete_in_progress(&self, category: &str) -> Result<(), ArchiveError> {
        match fs::remove_file(self.progress_path(category)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_completed(&self, session: &StorySession) -> Result<StoryId, ArchiveError> {
        let saved = SavedStory::from_session(session, Utc::now());
        let id = saved.story_id;
        self.write_atomic(&self.story_path(id), &saved)?;
        if let Some(parent) = saved.parent_story_id {
            self.link_sequel(parent, id)?;
        }
        tracing::info!(story_id = %id, "Story archived");
        Ok(id)
    }

    fn load_completed(&self, id: StoryId) -> Result<Option<SavedStory>, ArchiveError> {
        let path = self.story_path(id);
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update_completed(&self, story: &SavedStory) -> Result<(), ArchiveError> {
        self.write_atomic(&self.story_path(story.story_id), story)
    }

    fn link_sequel(&self, parent: StoryId, child: StoryId) -> Result<(), ArchiveError> {
        let Some(mut record) = self.load_completed(parent)? else {
            tracing::warn!(parent = %parent, child = %child, "Sequel parent not archived; skipping link");
            return Ok(());
        };
        if !record.sequel_story_ids.contains(&child) {
            record.sequel_story_ids.push(child);
            self.update_completed(&record)?;
        }
        Ok(())
    }

    fn list_completed(&self) -> Result<Vec<SavedStory>, ArchiveError> {
        let entries = match fs::read_dir(&self.stories_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stories = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            match fs::read_to_string(&path).map_err(ArchiveError::from).and_then(|json| {
                serde_json::from_str::<SavedStory>(&json).map_err(ArchiveError::from)
            }) {
                Ok(story) => stories.push(story),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable story record");
                }
            }
        }
        stories.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(stories)
    }
}

/// Category keys come from user input; keep them filesystem-safe.
fn sanitize_category(category: &str) -> String {
    let cleaned: String = category
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
