//! MediaResolver: import, copy/link, resolve and thumbnail project media.
//!
//! Two reference modes, selected per import by [`MediaPolicy`]:
//! - copy: bytes land in `<package>/media/` under a collision-free name
//! - link: the file stays put; a bookmark plus the absolute path are stored
//!
//! Resolution of a reference follows a fixed fallback chain, see
//! [`MediaResolver::resolve_media_reference`]. Thumbnails are rendered on the
//! background queue and never block or fail an import.

pub mod bookmark;
pub mod probe;
pub mod thumbnail;
#[cfg(feature = "ffmpeg")]
pub mod video;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use uuid::Uuid;

use crate::core::cancel::CancelToken;
use crate::core::workers::BackgroundQueue;
use crate::entities::{
    MediaPolicy, MediaReference, MediaType, SharedSession, read_session, write_session,
};
use crate::error::{ProjectError, Result};
use crate::store::package::{MEDIA_DIR, THUMBNAILS_DIR, unique_file_name};

use bookmark::{BookmarkProvider, PathBookmarks};
use probe::{MetadataProbe, StandardProbe};
use thumbnail::Thumbnailer;

#[cfg(feature = "ffmpeg")]
pub use video::{extract_video_frame, ffmpeg_init};

/// Outcome of a batch import. Per-file failures never abort the batch.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<MediaReference>,
    pub failed: Vec<ProjectError>,
    /// Batch stopped early on cancellation
    pub cancelled: bool,
}

#[derive(Debug, Default)]
pub struct CollectReport {
    pub collected: Vec<Uuid>,
    pub failed: Vec<ProjectError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub ok: usize,
    pub missing: Vec<Uuid>,
}

pub struct MediaResolver {
    bookmarks: Arc<dyn BookmarkProvider>,
    probe: Arc<dyn MetadataProbe>,
    thumbnailer: Arc<Thumbnailer>,
    background: Arc<BackgroundQueue>,
    treat_unknown_as_video: bool,
}

impl MediaResolver {
    pub fn new(background: Arc<BackgroundQueue>) -> Self {
        Self {
            bookmarks: Arc::new(PathBookmarks),
            probe: Arc::new(StandardProbe),
            thumbnailer: Arc::new(Thumbnailer::default()),
            background,
            treat_unknown_as_video: false,
        }
    }

    pub fn with_bookmarks(mut self, bookmarks: Arc<dyn BookmarkProvider>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn MetadataProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Classify unrecognized extensions as video instead of failing them.
    pub fn with_unknown_as_video(mut self, enabled: bool) -> Self {
        self.treat_unknown_as_video = enabled;
        self
    }

    fn classify(&self, path: &Path) -> Result<MediaType> {
        match MediaType::classify(path) {
            Some(media_type) => Ok(media_type),
            None if self.treat_unknown_as_video => {
                debug!("Unknown extension, treating {} as video", path.display());
                Ok(MediaType::Video)
            }
            None => Err(ProjectError::UnknownMediaType(path.to_path_buf())),
        }
    }

    // === Import ===

    /// Import `sources` into the session's package, one file at a time.
    ///
    /// `on_progress` receives `completed / total` after every file, failed
    /// ones included. Successful references are appended to the session at
    /// the end of the batch.
    pub fn import_media<F>(
        &self,
        sources: &[PathBuf],
        session: &SharedSession,
        policy: MediaPolicy,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<ImportReport>
    where
        F: FnMut(f64),
    {
        let root = read_session(session)
            .package_path()
            .ok_or(ProjectError::NoProjectUrl)?
            .to_path_buf();
        fs::create_dir_all(root.join(MEDIA_DIR))?;

        let total = sources.len();
        let mut report = ImportReport::default();

        for (index, source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Import cancelled after {} of {} file(s)", index, total);
                report.cancelled = true;
                break;
            }

            match self.import_one(source, &root, policy) {
                Ok(reference) => {
                    trace!("Imported {} as {}", source.display(), reference.id);
                    self.schedule_thumbnail(&reference, &root);
                    report.imported.push(reference);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", source.display(), e);
                    report.failed.push(e);
                }
            }
            on_progress((index + 1) as f64 / total as f64);
        }

        if !report.imported.is_empty() {
            let mut s = write_session(session);
            for reference in &report.imported {
                s.add_media_reference(reference.clone());
            }
        }

        info!(
            "Imported {} of {} file(s) ({} policy, {} failed)",
            report.imported.len(),
            total,
            policy,
            report.failed.len()
        );
        Ok(report)
    }

    fn import_one(&self, source: &Path, root: &Path, policy: MediaPolicy) -> Result<MediaReference> {
        if !source.is_file() {
            return Err(ProjectError::import_failed(source, "not a readable file"));
        }
        let media_type = self.classify(source)?;

        let (mut reference, location, copied) = match policy {
            MediaPolicy::Copy => {
                let (relative, destination) = copy_into_package(source, root)?;
                let reference = MediaReference::copied(source, relative, media_type);
                (reference, destination, true)
            }
            MediaPolicy::Link => {
                let absolute = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
                let bookmark = self.issue_bookmark(&absolute);
                let reference = MediaReference::linked(&absolute, bookmark, media_type);
                (reference, absolute, false)
            }
        };

        let metadata = match self.probe.probe(&location, media_type) {
            Ok(metadata) => metadata,
            Err(e) => {
                if copied {
                    let _ = fs::remove_file(&location);
                }
                return Err(ProjectError::import_failed(source, format!("{:#}", e)));
            }
        };
        reference.file_size = metadata.file_size;
        reference.last_modified = metadata.modified;
        reference.duration = metadata.duration;
        reference.original_path = source.to_path_buf();
        reference.thumbnail_path = Some(thumbnail_relative_path(reference.id));
        Ok(reference)
    }

    fn issue_bookmark(&self, path: &Path) -> Option<String> {
        match self.bookmarks.issue(path) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("No bookmark for {} ({}), keeping absolute path only", path.display(), e);
                None
            }
        }
    }

    fn schedule_thumbnail(&self, reference: &MediaReference, root: &Path) {
        let Some(source) = self.resolve_media_reference(reference, root) else {
            return;
        };
        let Some(relative) = &reference.thumbnail_path else {
            return;
        };
        let target = root.join(relative);
        let (media_type, id) = (reference.media_type, reference.id);
        let thumbnailer = Arc::clone(&self.thumbnailer);
        self.background.submit(format!("thumbnail {}", reference.file_name), move || {
            thumbnailer.render(&source, media_type, id, &target)
        });
    }

    // === Resolution ===

    /// Locate the bytes behind `reference`:
    /// 1. linked: the bookmark, if it resolves fresh to an existing file
    /// 2. linked: the stored absolute path, if it exists
    /// 3. copied: `relative_path` under `package_root`, if it exists
    ///
    /// `None` means currently unresolved, not an error.
    pub fn resolve_media_reference(
        &self,
        reference: &MediaReference,
        package_root: &Path,
    ) -> Option<PathBuf> {
        if reference.is_linked {
            if let Some(token) = &reference.bookmark {
                match self.bookmarks.resolve(token) {
                    Ok(resolved) if !resolved.is_stale && resolved.path.is_file() => {
                        return Some(resolved.path);
                    }
                    Ok(_) => trace!("Bookmark for {} is stale", reference.file_name),
                    Err(e) => trace!("Bookmark for {} failed: {}", reference.file_name, e),
                }
            }
            return reference.absolute_path.clone().filter(|p| p.is_file());
        }

        reference
            .relative_path
            .as_ref()
            .map(|relative| package_root.join(relative))
            .filter(|p| p.is_file())
    }

    /// Point `reference` at `new_path`: fresh bookmark, absolute path and
    /// metadata. The returned reference is linked; the caller stores it.
    pub fn relink_media(&self, reference: &MediaReference, new_path: &Path) -> Result<MediaReference> {
        let absolute = fs::canonicalize(new_path)
            .map_err(|e| ProjectError::import_failed(new_path, e))?;
        let metadata = self
            .probe
            .probe(&absolute, reference.media_type)
            .map_err(|e| ProjectError::import_failed(new_path, format!("{:#}", e)))?;

        let mut relinked = reference.clone();
        relinked.bookmark = self.issue_bookmark(&absolute);
        relinked.is_linked = true;
        relinked.relative_path = None;
        if let Some(name) = absolute.file_name() {
            relinked.file_name = name.to_string_lossy().into_owned();
        }
        relinked.absolute_path = Some(absolute);
        relinked.file_size = metadata.file_size;
        relinked.last_modified = metadata.modified;
        relinked.duration = metadata.duration;

        info!("Relinked {} to {}", reference.id, new_path.display());
        Ok(relinked)
    }

    // === Collect / verify / remove ===

    /// Copy every linked reference into the package and turn it into a
    /// copied one, then switch the project to the copy policy.
    pub fn collect_all_media(&self, session: &SharedSession) -> Result<CollectReport> {
        let (root, linked) = {
            let s = read_session(session);
            let root = s.package_path().ok_or(ProjectError::NoProjectUrl)?.to_path_buf();
            let linked: Vec<MediaReference> = s.media().iter().filter(|r| r.is_linked).cloned().collect();
            (root, linked)
        };
        fs::create_dir_all(root.join(MEDIA_DIR))?;

        let mut report = CollectReport::default();
        for reference in &linked {
            let Some(source) = self.resolve_media_reference(reference, &root) else {
                warn!("Cannot collect {}: source unresolved", reference.file_name);
                report.failed.push(ProjectError::import_failed(
                    &reference.original_path,
                    "linked file could not be resolved",
                ));
                continue;
            };

            match copy_into_package(&source, &root) {
                Ok((relative, _)) => {
                    let updated = write_session(session)
                        .update_media_reference(reference.id, |r| r.convert_to_copy(relative));
                    if updated {
                        report.collected.push(reference.id);
                    } else {
                        debug!("Reference {} removed while collecting", reference.id);
                    }
                }
                Err(e) => {
                    warn!("Cannot collect {}: {}", reference.file_name, e);
                    report.failed.push(e);
                }
            }
        }

        write_session(session).set_media_policy(MediaPolicy::Copy);
        info!(
            "Collected {} linked file(s) into {} ({} failed)",
            report.collected.len(),
            root.display(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Resolve every linked reference and report the ones that are gone.
    pub fn verify_links(&self, session: &SharedSession) -> LinkReport {
        let (root, linked) = {
            let s = read_session(session);
            let root = s.package_path().map(Path::to_path_buf).unwrap_or_default();
            let linked: Vec<MediaReference> = s.media().iter().filter(|r| r.is_linked).cloned().collect();
            (root, linked)
        };

        let mut report = LinkReport::default();
        for reference in &linked {
            if self.resolve_media_reference(reference, &root).is_some() {
                report.ok += 1;
            } else {
                warn!(
                    "Linked media missing: {} ({})",
                    reference.file_name,
                    reference.original_path.display()
                );
                report.missing.push(reference.id);
            }
        }
        debug!("Link check: {} ok, {} missing", report.ok, report.missing.len());
        report
    }

    /// Drop a reference from the session. With `delete_files`, the copied
    /// bytes and the thumbnail go too; linked files are never touched.
    pub fn remove_media(
        &self,
        session: &SharedSession,
        id: Uuid,
        delete_files: bool,
    ) -> Result<Option<MediaReference>> {
        let (root, removed) = {
            let mut s = write_session(session);
            let root = s.package_path().map(Path::to_path_buf);
            (root, s.remove_media_reference(id))
        };
        let Some(removed) = removed else {
            return Ok(None);
        };

        if delete_files {
            let root = root.ok_or(ProjectError::NoProjectUrl)?;
            let owned = [
                removed.relative_path.as_ref().filter(|_| !removed.is_linked),
                removed.thumbnail_path.as_ref(),
            ];
            for relative in owned.into_iter().flatten() {
                let path = root.join(relative);
                if let Err(e) = fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Could not delete {}: {}", path.display(), e);
                    }
                }
            }
        }
        info!("Removed media {} ({})", removed.file_name, id);
        Ok(Some(removed))
    }
}

fn thumbnail_relative_path(id: Uuid) -> PathBuf {
    Path::new(THUMBNAILS_DIR).join(format!("{}.png", id))
}

/// Copy `source` into `<root>/media/` without overwriting anything.
/// Returns the package-relative and absolute destination.
fn copy_into_package(source: &Path, root: &Path) -> Result<(PathBuf, PathBuf)> {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ProjectError::import_failed(source, "no file name"))?;
    let media_dir = root.join(MEDIA_DIR);
    let name = unique_file_name(&media_dir, &file_name);
    let destination = media_dir.join(&name);

    fs::copy(source, &destination).map_err(|e| {
        let _ = fs::remove_file(&destination);
        ProjectError::import_failed(source, e)
    })?;
    trace!("Copied {} -> {}", source.display(), destination.display());
    Ok((Path::new(MEDIA_DIR).join(name), destination))
}
