//! Filesystem layout for generated media.
//!
//! One flat naming scheme shared by every unit of work: primary scene
//! image `{scene_id}.png`, picture-book extras `{scene_id}_extra_{i}.png`,
//! scene video `{scene_id}.mp4`, story cover `{story_id}_cover.png`.
//! Writes are small whole files; "successfully generated" means the file
//! exists and is non-empty, so empty payloads are rejected up front.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use fableforge_domain::{SceneId, StoryId};

#[derive(Debug, Clone)]
pub struct MediaStore {
    images_dir: PathBuf,
    videos_dir: PathBuf,
}

/// Result of a successful write: where the file landed and the relative
/// URL a serving layer would hand out.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub path: PathBuf,
    pub url: String,
}

impl MediaStore {
    pub fn new(media_root: impl AsRef<Path>) -> Self {
        let root = media_root.as_ref();
        Self {
            images_dir: root.join("images"),
            videos_dir: root.join("videos"),
        }
    }

    pub fn save_scene_image(&self, scene_id: SceneId, bytes: &[u8]) -> io::Result<StoredMedia> {
        self.write_image(&format!("{scene_id}.png"), bytes)
    }

    pub fn save_extra_image(
        &self,
        scene_id: SceneId,
        index: usize,
        bytes: &[u8],
    ) -> io::Result<StoredMedia> {
        self.write_image(&format!("{scene_id}_extra_{index}.png"), bytes)
    }

    pub fn save_cover(&self, story_id: StoryId, bytes: &[u8]) -> io::Result<StoredMedia> {
        self.write_image(&format!("{story_id}_cover.png"), bytes)
    }

    pub fn save_video(&self, scene_id: SceneId, bytes: &[u8]) -> io::Result<StoredMedia> {
        let file_name = format!("{scene_id}.mp4");
        self.write(&self.videos_dir, "videos", &file_name, bytes)
    }

    pub fn image_path(&self, scene_id: SceneId) -> PathBuf {
        self.images_dir.join(format!("{scene_id}.png"))
    }

    pub fn has_image(&self, scene_id: SceneId) -> bool {
        fs::metadata(self.image_path(scene_id))
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    fn write_image(&self, file_name: &str, bytes: &[u8]) -> io::Result<StoredMedia> {
        self.write(&self.images_dir, "images", file_name, bytes)
    }

    fn write(
        &self,
        dir: &Path,
        url_segment: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> io::Result<StoredMedia> {
        if bytes.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("refusing to write empty media file {file_name}"),
            ));
        }
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        fs::write(&path, bytes)?;
        Ok(StoredMedia {
            path,
            url: format!("/media/{url_segment}/{file_name}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scene_image_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let scene_id = SceneId::new();

        let stored = store.save_scene_image(scene_id, b"png-bytes").unwrap();
        assert_eq!(stored.url, format!("/media/images/{scene_id}.png"));
        assert_eq!(stored.path, store.image_path(scene_id));
        assert!(store.has_image(scene_id));
        assert_eq!(fs::read(&stored.path).unwrap(), b"png-bytes");
    }

    #[test]
    fn empty_payload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let scene_id = SceneId::new();

        let err = store.save_scene_image(scene_id, b"").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!store.has_image(scene_id));
    }

    #[test]
    fn extras_videos_and_covers_use_distinct_names() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path());
        let scene_id = SceneId::new();
        let story_id = StoryId::new();

        let extra = store.save_extra_image(scene_id, 1, b"x").unwrap();
        assert_eq!(extra.url, format!("/media/images/{scene_id}_extra_1.png"));

        let video = store.save_video(scene_id, b"mp4").unwrap();
        assert_eq!(video.url, format!("/media/videos/{scene_id}.mp4"));

        let cover = store.save_cover(story_id, b"c").unwrap();
        assert_eq!(cover.url, format!("/media/images/{story_id}_cover.png"));
    }
}
