//! On-disk package layout and whole-tree filesystem helpers.
//!
//! ```text
//! <Title>.vvproj/
//!   manifest.json  timeline.json  routing.json  mixer.json  effects.json
//!   media.json                      media reference index
//!   media/  thumbnails/  cache/
//!   .versions/v<N>_<timestamp>/     snapshots of the json files
//! ```

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, trace, warn};

use super::versions::STAGING_PREFIX;

pub const PACKAGE_EXTENSION: &str = "vvproj";

pub const MEDIA_DIR: &str = "media";
pub const THUMBNAILS_DIR: &str = "thumbnails";
pub const CACHE_DIR: &str = "cache";
pub const VERSIONS_DIR: &str = ".versions";

pub const REQUIRED_DIRS: [&str; 4] = [MEDIA_DIR, THUMBNAILS_DIR, CACHE_DIR, VERSIONS_DIR];

/// Serialized documents at the package root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageFile {
    Manifest,
    Timeline,
    Routing,
    Mixer,
    Effects,
    MediaIndex,
}

impl PackageFile {
    pub const ALL: [PackageFile; 6] = [
        PackageFile::Manifest,
        PackageFile::Timeline,
        PackageFile::Routing,
        PackageFile::Mixer,
        PackageFile::Effects,
        PackageFile::MediaIndex,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            PackageFile::Manifest => "manifest.json",
            PackageFile::Timeline => "timeline.json",
            PackageFile::Routing => "routing.json",
            PackageFile::Mixer => "mixer.json",
            PackageFile::Effects => "effects.json",
            PackageFile::MediaIndex => "media.json",
        }
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

/// Make a title safe to use as a directory name.
pub fn sanitize_title(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim().trim_matches('.').trim();
    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<directory>/<sanitized title>.vvproj`
pub fn package_path_for(directory: &Path, title: &str) -> PathBuf {
    directory.join(format!("{}.{}", sanitize_title(title), PACKAGE_EXTENSION))
}

/// Create any missing required directory. Returns the names that were created.
pub fn ensure_layout(root: &Path) -> io::Result<Vec<&'static str>> {
    let mut created = Vec::new();
    for dir in REQUIRED_DIRS {
        let path = root.join(dir);
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
            created.push(dir);
        }
    }
    Ok(created)
}

/// Recursively copy `src` to `dst` byte-for-byte. `dst` must not exist.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    copy_filtered(src, dst, &|_, _| false)
}

/// [`copy_tree`] without the leftovers of a save in progress: staged
/// `*.tmp` files and snapshot staging directories.
pub fn copy_package(src: &Path, dst: &Path) -> io::Result<()> {
    copy_filtered(src, dst, &|name, is_dir| {
        let name = name.to_string_lossy();
        if is_dir {
            name.starts_with(STAGING_PREFIX)
        } else {
            name.ends_with(".tmp")
        }
    })
}

fn copy_filtered(src: &Path, dst: &Path, skip: &dyn Fn(&OsStr, bool) -> bool) -> io::Result<()> {
    fs::create_dir(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        let file_type = entry.file_type()?;
        if skip(&name, file_type.is_dir()) {
            trace!("Skipping {}", entry.path().display());
            continue;
        }
        let target = dst.join(&name);
        if file_type.is_dir() {
            copy_filtered(&entry.path(), &target, skip)?;
        } else {
            // Symlinks are followed: the copy must stand on its own
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Pick a file name in `dir` that doesn't exist yet: `clip.mp4`,
/// `clip_1.mp4`, `clip_2.mp4`, ...
pub fn unique_file_name(dir: &Path, file_name: &str) -> String {
    if !dir.join(file_name).exists() {
        return file_name.to_string();
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };

    (1u32..)
        .map(|n| match ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        })
        .find(|candidate| !dir.join(candidate).exists())
        .unwrap_or_else(|| file_name.to_string())
}

/// Move a package into `trash_dir` under a timestamped name so it can be
/// recovered. Returns the new location.
pub fn move_to_trash(root: &Path, trash_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(trash_dir)?;

    let stem = root
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let name = unique_file_name(
        trash_dir,
        &format!("{}-{}.{}", stem, stamp, PACKAGE_EXTENSION),
    );
    let target = trash_dir.join(name);

    match fs::rename(root, &target) {
        Ok(()) => {}
        Err(e) => {
            // Different volume: fall back to copy + remove
            debug!("rename to trash failed ({}), copying instead", e);
            copy_tree(root, &target)?;
            if let Err(e) = fs::remove_dir_all(root) {
                warn!("Copied {} to trash but could not remove original: {}", root.display(), e);
                return Err(e);
            }
        }
    }
    Ok(target)
}
