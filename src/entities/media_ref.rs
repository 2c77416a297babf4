//! MediaReference: one media asset referenced by a project.
//!
//! Copied assets resolve through `relativePath` (under the package root),
//! linked assets through the bookmark and then `absolutePath`. `isLinked`
//! selects which one is authoritative.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Image,
}

const VIDEO_EXTS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm", "mxf", "mts", "mpg", "mpeg"];
const AUDIO_EXTS: &[&str] = &["wav", "mp3", "aac", "m4a", "flac", "ogg", "aif", "aiff", "opus"];
const IMAGE_EXTS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp", "heic"];

impl MediaType {
    /// Classify by file extension (case-insensitive). `None` if unrecognized.
    pub fn classify(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if VIDEO_EXTS.contains(&ext.as_str()) {
            Some(MediaType::Video)
        } else if AUDIO_EXTS.contains(&ext.as_str()) {
            Some(MediaType::Audio)
        } else if IMAGE_EXTS.contains(&ext.as_str()) {
            Some(MediaType::Image)
        } else {
            None
        }
    }

    /// Video and audio carry a duration, stills don't.
    pub fn is_timed(&self) -> bool {
        matches!(self, MediaType::Video | MediaType::Audio)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaReference {
    pub id: Uuid,
    pub original_path: PathBuf,
    /// Package-relative path, set when the bytes were copied in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<PathBuf>,
    /// External location, set when linked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_path: Option<PathBuf>,
    pub file_name: String,
    pub file_size: u64,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
    pub is_linked: bool,
    pub last_modified: DateTime<Utc>,
    /// Opaque capability token for linked files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

impl MediaReference {
    /// Reference to bytes copied into the package at `relative_path`.
    pub fn copied(original: &Path, relative_path: PathBuf, media_type: MediaType) -> Self {
        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            original_path: original.to_path_buf(),
            relative_path: Some(relative_path),
            absolute_path: None,
            file_name,
            file_size: 0,
            duration: None,
            media_type,
            thumbnail_path: None,
            is_linked: false,
            last_modified: Utc::now(),
            bookmark: None,
        }
    }

    /// Reference to an external file.
    pub fn linked(original: &Path, bookmark: Option<String>, media_type: MediaType) -> Self {
        let file_name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            original_path: original.to_path_buf(),
            relative_path: None,
            absolute_path: Some(original.to_path_buf()),
            file_name,
            file_size: 0,
            duration: None,
            media_type,
            thumbnail_path: None,
            is_linked: true,
            last_modified: Utc::now(),
            bookmark,
        }
    }

    /// Turn a linked reference into a copied one.
    pub fn convert_to_copy(&mut self, relative_path: PathBuf) {
        if let Some(name) = relative_path.file_name() {
            self.file_name = name.to_string_lossy().into_owned();
        }
        self.relative_path = Some(relative_path);
        self.absolute_path = None;
        self.bookmark = None;
        self.is_linked = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_extensions() {
        assert_eq!(MediaType::classify(Path::new("a/clip.MP4")), Some(MediaType::Video));
        assert_eq!(MediaType::classify(Path::new("voice.wav")), Some(MediaType::Audio));
        assert_eq!(MediaType::classify(Path::new("logo.Jpeg")), Some(MediaType::Image));
        assert_eq!(MediaType::classify(Path::new("notes.txt")), None);
        assert_eq!(MediaType::classify(Path::new("README")), None);
    }

    #[test]
    fn test_linked_reference_serializes_without_relative_path() {
        let r = MediaReference::linked(
            Path::new("/footage/a.mov"),
            Some("token".into()),
            MediaType::Video,
        );
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("relativePath").is_none());
        assert_eq!(json["absolutePath"], "/footage/a.mov");
        assert_eq!(json["isLinked"], true);
        assert_eq!(json["mediaType"], "video");
    }

    #[test]
    fn test_convert_to_copy_clears_link_state() {
        let mut r = MediaReference::linked(Path::new("/x/a.png"), Some("t".into()), MediaType::Image);
        r.convert_to_copy(PathBuf::from("media/a_1.png"));
        assert!(!r.is_linked);
        assert!(r.bookmark.is_none());
        assert!(r.absolute_path.is_none());
        assert_eq!(r.file_name, "a_1.png");
    }
}
