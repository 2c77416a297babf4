//! ProjectStore: package lifecycle on disk.
//!
//! Create, open, save, duplicate and delete `.vvproj` packages. Saves are
//! coalesced per package path: a new save cancels the one in flight
//! (latest wins) and only one writer touches a package at a time.
//!
//! Internal registries (in-flight saves, advisory locks, per-path writer
//! locks, version counters) live behind one mutex owned by the store and
//! are never handed out.

pub mod atomic;
pub mod autosave;
pub mod package;
pub mod versions;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::config::Settings;
use crate::core::cancel::CancelToken;
use crate::core::workers::BackgroundQueue;
use crate::entities::{
    Components, Manifest, MediaPolicy, MediaReference, ProjectSession, ProjectTemplate,
    SessionSnapshot, SharedSession, read_session, write_session,
};
use crate::error::{ProjectError, Result};
use crate::media::MediaResolver;
use crate::media::thumbnail::Thumbnailer;
use crate::recent::RecentProjects;

pub use autosave::AutoSave;
pub use package::{PACKAGE_EXTENSION, PackageFile};
pub use versions::VersionInfo;

/// Result of a save that didn't fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// All files replaced; `version` is the snapshot taken before the write
    Committed { version: u64 },
    /// Superseded by a newer save of the same package; nothing was written
    Cancelled,
}

/// Placeholder advisory lock. Only tracked in memory, not enforced across
/// processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(Uuid);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub version_retention: usize,
    pub trash_dir: PathBuf,
}

impl StoreConfig {
    pub fn from_settings(settings: &Settings, default_trash: PathBuf) -> Self {
        Self {
            version_retention: settings.version_retention,
            trash_dir: settings.trash_dir.clone().unwrap_or(default_trash),
        }
    }
}

struct SaveTicket {
    id: u64,
    cancel: CancelToken,
}

#[derive(Default)]
struct Registry {
    saves: HashMap<PathBuf, SaveTicket>,
    locks: HashMap<PathBuf, LockToken>,
    writers: HashMap<PathBuf, Arc<Mutex<()>>>,
    version_counters: HashMap<PathBuf, u64>,
    next_task_id: u64,
}

impl Registry {
    /// Counters are reseeded from disk on the next save.
    fn forget_writer(&mut self, key: &Path) {
        self.writers.remove(key);
        self.version_counters.remove(key);
    }
}

pub struct ProjectStore {
    config: StoreConfig,
    registry: Mutex<Registry>,
    background: Arc<BackgroundQueue>,
    thumbnailer: Arc<Thumbnailer>,
    media: Option<Arc<MediaResolver>>,
    recent: Option<Arc<RecentProjects>>,
}

/// Registry key for a package: canonical when the directory exists.
fn registry_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn save_failed(context: &str, e: impl std::fmt::Display) -> ProjectError {
    ProjectError::SaveFailed(format!("{}: {}", context, e))
}

fn load_failed(path: &Path, e: impl std::fmt::Display) -> ProjectError {
    ProjectError::LoadFailed(format!("{}: {}", path.display(), e))
}

impl ProjectStore {
    pub fn new(config: StoreConfig, background: Arc<BackgroundQueue>) -> Self {
        Self {
            config,
            registry: Mutex::new(Registry::default()),
            background,
            thumbnailer: Arc::new(Thumbnailer::default()),
            media: None,
            recent: None,
        }
    }

    /// Run a link verification pass after every open.
    pub fn with_media_resolver(mut self, media: Arc<MediaResolver>) -> Self {
        self.media = Some(media);
        self
    }

    /// Register created/opened packages in the recent projects list.
    pub fn with_recent_projects(mut self, recent: Arc<RecentProjects>) -> Self {
        self.recent = Some(recent);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn background(&self) -> &Arc<BackgroundQueue> {
        &self.background
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Create / open ===

    /// Create `<directory>/<title>.vvproj` from a template and save it.
    pub fn create_project(
        &self,
        title: &str,
        template: ProjectTemplate,
        media_policy: MediaPolicy,
        directory: &Path,
    ) -> Result<SharedSession> {
        let path = package::package_path_for(directory, title);
        if path.exists() {
            return Err(ProjectError::PackageAlreadyExists(path));
        }

        fs::create_dir_all(directory)?;
        fs::create_dir(&path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => ProjectError::PackageAlreadyExists(path.clone()),
            _ => ProjectError::Io(e),
        })?;
        package::ensure_layout(&path)?;

        let mut session = ProjectSession::from_template(title, template, media_policy);
        session.set_package_path(Some(path.clone()));
        let session = session.into_shared();

        self.acquire_lock(&path);
        if let Err(e) = self.save_project(&session) {
            self.release_lock(&path);
            return Err(e);
        }

        info!(
            "Created project '{}' ({} template, {} media) at {}",
            title,
            template,
            media_policy,
            path.display()
        );
        self.schedule_package_thumbnail(&session);
        self.schedule_recent(&session);
        Ok(session)
    }

    /// Open an existing package. Missing directories are recreated; missing
    /// component files load as empty documents.
    pub fn open_project(&self, path: &Path) -> Result<SharedSession> {
        let session = self.open_package(path)?;
        self.schedule_link_verification(&session);
        self.schedule_recent(&session);
        Ok(session)
    }

    /// Open and lock without queueing follow-up jobs.
    fn open_package(&self, path: &Path) -> Result<SharedSession> {
        if !path.is_dir() {
            return Err(ProjectError::InvalidPackageStructure(format!(
                "{} is not a package directory",
                path.display()
            )));
        }
        if !PackageFile::Manifest.path_in(path).is_file() {
            return Err(ProjectError::InvalidPackageStructure(format!(
                "{} has no {}",
                path.display(),
                PackageFile::Manifest.file_name()
            )));
        }

        for dir in package::ensure_layout(path)? {
            warn!("Package {} was missing '{}', recreated", path.display(), dir);
        }
        versions::cleanup_staging(path);

        self.acquire_lock(path);
        let session = match self.load_session(path) {
            Ok(session) => session,
            Err(e) => {
                self.release_lock(path);
                error!("Failed to open {}: {}", path.display(), e);
                return Err(e);
            }
        };

        info!(
            "Opened project '{}' ({} media) from {}",
            session.manifest().title,
            session.media().len(),
            path.display()
        );
        Ok(session.into_shared())
    }

    fn load_session(&self, path: &Path) -> Result<ProjectSession> {
        let manifest_path = PackageFile::Manifest.path_in(path);
        let bytes = fs::read(&manifest_path).map_err(|e| load_failed(&manifest_path, e))?;
        let mut manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|e| load_failed(&manifest_path, e))?;
        manifest.migrate()?;

        let (components, media) = read_documents(path)?;
        let mut session = ProjectSession::new(manifest, components, media, Some(path.to_path_buf()));
        session.mark_clean();
        Ok(session)
    }

    // === Save ===

    /// Save the session to its package.
    ///
    /// Cancels any save of the same package still in flight. Returns
    /// [`SaveOutcome::Cancelled`] (not an error) if this call is itself
    /// superseded before it commits.
    pub fn save_project(&self, session: &SharedSession) -> Result<SaveOutcome> {
        let (root, snapshot) = {
            let s = read_session(session);
            let root = s.package_path().ok_or(ProjectError::NoProjectUrl)?.to_path_buf();
            (root, s.snapshot())
        };
        if !root.is_dir() {
            return Err(ProjectError::SaveFailed(format!(
                "package {} no longer exists",
                root.display()
            )));
        }
        let key = registry_key(&root);

        let (task_id, cancel, writer) = self.begin_save(&key);
        let result = self.run_save(&root, &key, &snapshot, task_id, &cancel, &writer);

        match result {
            Ok(SaveOutcome::Committed { version }) => {
                self.finish_save(&key, task_id);
                let clean = write_session(session).mark_saved_revision(snapshot.revision);
                info!(
                    "Saved '{}' (version {}){}",
                    snapshot.manifest.title,
                    version,
                    if clean { "" } else { ", newer edits pending" }
                );
                Ok(SaveOutcome::Committed { version })
            }
            Ok(SaveOutcome::Cancelled) => {
                // Registry entry already belongs to the superseding save
                debug!("Save task {} for {} superseded", task_id, root.display());
                Ok(SaveOutcome::Cancelled)
            }
            Err(e) => {
                self.finish_save(&key, task_id);
                error!("Save of {} failed: {}", root.display(), e);
                Err(e)
            }
        }
    }

    /// Cancel whatever save is in flight for `key` and register a new one.
    fn begin_save(&self, key: &Path) -> (u64, CancelToken, Arc<Mutex<()>>) {
        let mut registry = self.registry();
        registry.next_task_id += 1;
        let id = registry.next_task_id;

        if let Some(previous) = registry.saves.remove(key) {
            debug!("Cancelling save task {} for {}", previous.id, key.display());
            previous.cancel.cancel();
        }

        let cancel = CancelToken::new();
        registry.saves.insert(
            key.to_path_buf(),
            SaveTicket {
                id,
                cancel: cancel.clone(),
            },
        );
        let writer = Arc::clone(registry.writers.entry(key.to_path_buf()).or_default());
        (id, cancel, writer)
    }

    fn finish_save(&self, key: &Path, task_id: u64) {
        let mut registry = self.registry();
        if registry.saves.get(key).is_some_and(|t| t.id == task_id) {
            registry.saves.remove(key);
        }
    }

    fn next_version_number(&self, key: &Path, root: &Path) -> u64 {
        let mut registry = self.registry();
        let counter = registry
            .version_counters
            .entry(key.to_path_buf())
            .or_insert_with(|| versions::highest_number(root));
        *counter += 1;
        *counter
    }

    fn run_save(
        &self,
        root: &Path,
        key: &Path,
        snapshot: &SessionSnapshot,
        task_id: u64,
        cancel: &CancelToken,
        writer: &Mutex<()>,
    ) -> Result<SaveOutcome> {
        let documents = serialize_snapshot(snapshot)?;

        // Single writer per package; a superseded holder exits at its next checkpoint
        let _writer = writer.lock().unwrap_or_else(|e| e.into_inner());
        if cancel.is_cancelled() {
            return Ok(SaveOutcome::Cancelled);
        }

        let staging =
            versions::stage(root, task_id).map_err(|e| save_failed("version snapshot", e))?;
        if cancel.is_cancelled() {
            versions::discard(&staging);
            return Ok(SaveOutcome::Cancelled);
        }

        let staged: Vec<io::Result<PathBuf>> = documents
            .par_iter()
            .map(|(file, bytes)| atomic::stage(&file.path_in(root), bytes))
            .collect();

        let mut tmp_files = Vec::with_capacity(staged.len());
        let mut first_error = None;
        for result in staged {
            match result {
                Ok(tmp) => tmp_files.push(tmp),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        let discard_all = |tmp_files: &[PathBuf]| {
            tmp_files.iter().for_each(|tmp| atomic::discard(tmp));
            versions::discard(&staging);
        };
        if let Some(e) = first_error {
            discard_all(&tmp_files);
            return Err(save_failed("write", e));
        }
        if cancel.is_cancelled() {
            discard_all(&tmp_files);
            return Ok(SaveOutcome::Cancelled);
        }

        for ((file, _), tmp) in documents.iter().zip(&tmp_files) {
            if let Err(e) = atomic::commit(tmp, &file.path_in(root)) {
                discard_all(&tmp_files);
                return Err(save_failed(file.file_name(), e));
            }
        }

        // Files are in place from here on; a lost snapshot doesn't fail the save
        let number = self.next_version_number(key, root);
        if versions::commit_or_discard(&staging, root, number).is_none() {
            warn!("Saved {} without version {}", root.display(), number);
        }

        match versions::prune(root, self.config.version_retention) {
            Ok(removed) if !removed.is_empty() => {
                debug!("Pruned {} old version(s) of {}", removed.len(), root.display())
            }
            Ok(_) => {}
            Err(e) => warn!("Version pruning failed for {}: {}", root.display(), e),
        }

        Ok(SaveOutcome::Committed { version: number })
    }

    /// Start the auto-save loop for `session`.
    pub fn enable_auto_save(self: &Arc<Self>, session: &SharedSession, interval: Duration) -> AutoSave {
        AutoSave::start(Arc::clone(self), Arc::clone(session), interval)
    }

    // === Duplicate / delete ===

    /// Copy the package at `source` to `<directory>/<new_title>.vvproj` and
    /// give the copy a new identity.
    pub fn duplicate_project(
        &self,
        source: &Path,
        new_title: &str,
        directory: &Path,
    ) -> Result<SharedSession> {
        let destination = package::package_path_for(directory, new_title);
        if destination.exists() {
            return Err(ProjectError::PackageAlreadyExists(destination));
        }
        if !PackageFile::Manifest.path_in(source).is_file() {
            return Err(ProjectError::InvalidPackageStructure(format!(
                "{} has no {}",
                source.display(),
                PackageFile::Manifest.file_name()
            )));
        }

        fs::create_dir_all(directory)?;
        if let Err(e) = package::copy_package(source, &destination) {
            // Only clean up what this call created
            if e.kind() != io::ErrorKind::AlreadyExists {
                let _ = fs::remove_dir_all(&destination);
            }
            return Err(match e.kind() {
                io::ErrorKind::AlreadyExists => ProjectError::PackageAlreadyExists(destination),
                _ => ProjectError::Io(e),
            });
        }

        // Follow-up jobs wait for the new identity to be on disk
        let session = self.open_package(&destination)?;
        write_session(&session).reidentify(new_title);
        if let Err(e) = self.save_project(&session) {
            self.release_lock(&destination);
            return Err(e);
        }

        info!(
            "Duplicated {} as '{}' at {}",
            source.display(),
            new_title,
            destination.display()
        );
        self.schedule_package_thumbnail(&session);
        self.schedule_link_verification(&session);
        self.schedule_recent(&session);
        Ok(session)
    }

    /// Release the lock and move the package to the trash directory.
    pub fn delete_project(&self, path: &Path) -> Result<PathBuf> {
        let key = registry_key(path);
        {
            let mut registry = self.registry();
            registry.locks.remove(&key);
            if let Some(save) = registry.saves.remove(&key) {
                save.cancel.cancel();
            }
            registry.forget_writer(&key);
        }

        let trashed = package::move_to_trash(path, &self.config.trash_dir)?;
        info!("Moved {} to {}", path.display(), trashed.display());
        if let Some(recent) = &self.recent {
            if let Err(e) = recent.forget(&key) {
                warn!("Could not update recent projects: {:#}", e);
            }
        }
        Ok(trashed)
    }

    // === Advisory locks ===

    fn acquire_lock(&self, path: &Path) -> LockToken {
        let token = LockToken(Uuid::new_v4());
        let previous = self.registry().locks.insert(registry_key(path), token);
        if previous.is_some() {
            debug!("Lock for {} re-acquired", path.display());
        }
        token
    }

    /// Drop the advisory lock. Per-path save state goes with it unless a
    /// save of that package is still running.
    pub fn release_lock(&self, path: &Path) -> bool {
        let key = registry_key(path);
        let mut registry = self.registry();
        if !registry.saves.contains_key(&key) {
            registry.forget_writer(&key);
        }
        registry.locks.remove(&key).is_some()
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.registry().locks.contains_key(&registry_key(path))
    }

    /// Id of the save currently in flight for `path`.
    pub fn in_flight_save(&self, path: &Path) -> Option<u64> {
        self.registry().saves.get(&registry_key(path)).map(|t| t.id)
    }

    // === Versions ===

    pub fn list_versions(&self, path: &Path) -> Result<Vec<VersionInfo>> {
        Ok(versions::list(path)?)
    }

    /// Load components and media of version `number` into the session.
    /// Identity is kept; the session is left dirty for the caller to save.
    pub fn restore_version(&self, session: &SharedSession, number: u64) -> Result<()> {
        let root = read_session(session)
            .package_path()
            .ok_or(ProjectError::NoProjectUrl)?
            .to_path_buf();
        let version = versions::list(&root)?
            .into_iter()
            .find(|v| v.number == number)
            .ok_or_else(|| {
                ProjectError::LoadFailed(format!("version {} not found in {}", number, root.display()))
            })?;

        let (components, media) = read_documents(&version.path)?;
        write_session(session).replace_contents(components, media);
        info!("Restored version {} of {}", number, root.display());
        Ok(())
    }

    // === Background work ===

    fn schedule_package_thumbnail(&self, session: &SharedSession) {
        let (title, id, root) = {
            let s = read_session(session);
            let Some(root) = s.package_path() else {
                return;
            };
            (s.manifest().title.clone(), s.manifest().project_id, root.to_path_buf())
        };
        let thumbnailer = Arc::clone(&self.thumbnailer);
        self.background.submit(format!("package thumbnail '{}'", title), move || {
            let target = root.join(package::THUMBNAILS_DIR).join("package.png");
            thumbnailer.render_package_card(&title, id, &target)
        });
    }

    fn schedule_link_verification(&self, session: &SharedSession) {
        let Some(media) = &self.media else {
            return;
        };
        if !read_session(session).media().iter().any(|r| r.is_linked) {
            return;
        }
        let media = Arc::clone(media);
        let session = Arc::clone(session);
        self.background.submit("verify media links", move || {
            let report = media.verify_links(&session);
            if !report.missing.is_empty() {
                info!("{} linked media file(s) need relinking", report.missing.len());
            }
            Ok(())
        });
    }

    fn schedule_recent(&self, session: &SharedSession) {
        let Some(recent) = &self.recent else {
            return;
        };
        let (path, title) = {
            let s = read_session(session);
            let Some(path) = s.package_path() else {
                return;
            };
            (path.to_path_buf(), s.manifest().title.clone())
        };
        let recent = Arc::clone(recent);
        self.background
            .submit("register recent project", move || recent.register(&path, &title));
    }
}

/// Serialize everything a save writes, in [`PackageFile::ALL`] order.
fn serialize_snapshot(snapshot: &SessionSnapshot) -> Result<Vec<(PackageFile, Vec<u8>)>> {
    let encode = |file: PackageFile| -> Result<Vec<u8>> {
        let bytes = match file {
            PackageFile::Manifest => serde_json::to_vec_pretty(&snapshot.manifest),
            PackageFile::Timeline => serde_json::to_vec_pretty(&snapshot.components.timeline),
            PackageFile::Routing => serde_json::to_vec_pretty(&snapshot.components.routing),
            PackageFile::Mixer => serde_json::to_vec_pretty(&snapshot.components.mixer),
            PackageFile::Effects => serde_json::to_vec_pretty(&snapshot.components.effects),
            PackageFile::MediaIndex => serde_json::to_vec_pretty(&snapshot.media),
        };
        bytes.map_err(|e| save_failed(file.file_name(), e))
    };
    PackageFile::ALL
        .into_iter()
        .map(|file| Ok((file, encode(file)?)))
        .collect()
}

/// Read the four components and the media index from `dir` concurrently.
/// Absent files become empty documents.
fn read_documents(dir: &Path) -> Result<(Components, Vec<MediaReference>)> {
    const DOCUMENTS: [PackageFile; 5] = [
        PackageFile::Timeline,
        PackageFile::Routing,
        PackageFile::Mixer,
        PackageFile::Effects,
        PackageFile::MediaIndex,
    ];

    let loaded: Vec<Result<Option<Value>>> = DOCUMENTS
        .par_iter()
        .map(|file| {
            let path = file.path_in(dir);
            match fs::read(&path) {
                Ok(bytes) => serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|e| load_failed(&path, e)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} absent, using empty document", path.display());
                    Ok(None)
                }
                Err(e) => Err(load_failed(&path, e)),
            }
        })
        .collect();

    let mut values = Vec::with_capacity(loaded.len());
    for result in loaded {
        values.push(result?);
    }
    let mut values = values.into_iter();
    let mut next_document =
        || values.next().flatten().unwrap_or_else(|| Value::Object(Default::default()));

    let components = Components {
        timeline: next_document(),
        routing: next_document(),
        mixer: next_document(),
        effects: next_document(),
    };
    let media = match values.next().flatten() {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| load_failed(&PackageFile::MediaIndex.path_in(dir), e))?,
        None => Vec::new(),
    };
    Ok((components, media))
}
