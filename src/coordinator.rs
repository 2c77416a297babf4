//! ProjectCoordinator: owns the current session for the UI.
//!
//! At most one project is open. Opening, creating or duplicating installs
//! the result as the current session and re-arms auto-save; closing always
//! succeeds, even if the final save doesn't.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::{PathConfig, RECENT_FILE, Settings};
use crate::core::cancel::CancelToken;
use crate::core::workers::BackgroundQueue;
use crate::entities::{
    MediaPolicy, MediaReference, ProjectTemplate, SharedSession, read_session, write_session,
};
use crate::error::{ProjectError, Result};
use crate::media::{CollectReport, ImportReport, MediaResolver};
use crate::recent::RecentProjects;
use crate::store::{AutoSave, ProjectStore, SaveOutcome, StoreConfig};

pub struct ProjectCoordinator {
    store: Arc<ProjectStore>,
    media: Arc<MediaResolver>,
    autosave_interval: Duration,
    current: Option<SharedSession>,
    autosave: Option<AutoSave>,
}

impl ProjectCoordinator {
    pub fn new(store: Arc<ProjectStore>, media: Arc<MediaResolver>, autosave_interval: Duration) -> Self {
        Self {
            store,
            media,
            autosave_interval,
            current: None,
            autosave: None,
        }
    }

    /// Wire store, resolver, background queue and recent list from settings.
    pub fn from_settings(settings: &Settings, paths: &PathConfig) -> Self {
        let background = Arc::new(BackgroundQueue::new(
            settings.worker_count(),
            settings.background_queue_capacity,
        ));
        let media = Arc::new(
            MediaResolver::new(Arc::clone(&background))
                .with_unknown_as_video(settings.treat_unknown_as_video),
        );
        let recent = Arc::new(RecentProjects::new(
            paths.data_file(RECENT_FILE),
            settings.recent_projects_limit,
        ));
        let store = ProjectStore::new(
            StoreConfig::from_settings(settings, paths.default_trash_dir()),
            background,
        )
        .with_media_resolver(Arc::clone(&media))
        .with_recent_projects(recent);

        Self::new(
            Arc::new(store),
            media,
            Duration::from_secs(settings.autosave_interval_secs.max(1)),
        )
    }

    pub fn store(&self) -> &Arc<ProjectStore> {
        &self.store
    }

    pub fn media(&self) -> &Arc<MediaResolver> {
        &self.media
    }

    // === Session lifecycle ===

    /// Open `path` and make it current. The current project stays open if
    /// this fails.
    pub fn open_project(&mut self, path: &Path) -> Result<SharedSession> {
        if self.is_current_package(path) {
            // Reopening reads from disk: flush pending edits first
            self.save_quietly();
        }
        let session = self.store.open_project(path)?;
        Ok(self.replace_current(session))
    }

    pub fn create_new_project(
        &mut self,
        title: &str,
        template: ProjectTemplate,
        media_policy: MediaPolicy,
        directory: &Path,
    ) -> Result<SharedSession> {
        let session = self
            .store
            .create_project(title, template, media_policy, directory)?;
        Ok(self.replace_current(session))
    }

    /// Duplicate the current project next to it (or into `directory`) and
    /// switch to the copy. Unsaved edits are saved into the source first.
    pub fn duplicate_current_project(
        &mut self,
        new_title: &str,
        directory: Option<&Path>,
    ) -> Result<SharedSession> {
        let source = self.current_package_path()?;
        let directory = match directory {
            Some(dir) => dir.to_path_buf(),
            None => source
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };

        if self.is_dirty() {
            self.save_current_project()?;
        }
        let copy = self.store.duplicate_project(&source, new_title, &directory)?;
        Ok(self.replace_current(copy))
    }

    /// Explicit save; failures reach the caller.
    pub fn save_current_project(&self) -> Result<SaveOutcome> {
        let session = self.current.as_ref().ok_or(ProjectError::NoProjectUrl)?;
        self.store.save_project(session)
    }

    /// Disarm auto-save, save if dirty (failures only logged), release the
    /// lock and drop the session.
    pub fn close_current_project(&mut self) {
        if let Some(autosave) = self.autosave.take() {
            autosave.stop();
        }
        if let Some(session) = self.current.take() {
            self.retire(&session, None);
        }
    }

    /// Install `session` as current, closing the one it replaces.
    fn replace_current(&mut self, session: SharedSession) -> SharedSession {
        if let Some(autosave) = self.autosave.take() {
            autosave.stop();
        }
        if let Some(previous) = self.current.take() {
            let path = read_session(&session).package_path().map(Path::to_path_buf);
            self.retire(&previous, path.as_deref());
        }
        self.install(session)
    }

    /// Save (best effort) and unlock a session leaving the coordinator. A
    /// session replaced by a reopen of its own package was flushed before
    /// the reopen and keeps the lock.
    fn retire(&self, session: &SharedSession, reopened: Option<&Path>) {
        let (dirty, path, title) = {
            let s = read_session(session);
            (
                s.is_dirty(),
                s.package_path().map(Path::to_path_buf),
                s.manifest().title.clone(),
            )
        };
        let reopened = match (&path, reopened) {
            (Some(path), Some(new)) => same_package(path, new),
            _ => false,
        };
        if reopened {
            debug!("Reopened '{}', keeping lock", title);
            return;
        }

        if dirty {
            self.save_logged(session);
        }
        if let Some(path) = path {
            self.store.release_lock(&path);
        }
        info!("Closed project '{}'", title);
    }

    fn save_quietly(&self) {
        if let Some(session) = &self.current {
            if read_session(session).is_dirty() {
                self.save_logged(session);
            }
        }
    }

    /// Save with failures logged, not returned.
    fn save_logged(&self, session: &SharedSession) {
        let title = read_session(session).manifest().title.clone();
        match self.store.save_project(session) {
            Ok(SaveOutcome::Committed { version }) => {
                debug!("Saved '{}' (version {})", title, version)
            }
            Ok(SaveOutcome::Cancelled) => debug!("Save of '{}' superseded", title),
            Err(e) => warn!("Could not save '{}': {}", title, e),
        }
    }

    fn install(&mut self, session: SharedSession) -> SharedSession {
        self.autosave = Some(self.store.enable_auto_save(&session, self.autosave_interval));
        self.current = Some(Arc::clone(&session));
        session
    }

    fn is_current_package(&self, path: &Path) -> bool {
        self.current_package_path()
            .is_ok_and(|current| same_package(&current, path))
    }

    // === Media ===

    /// Import into the current project using its media policy.
    pub fn import_media<F>(&self, sources: &[PathBuf], cancel: &CancelToken, on_progress: F) -> Result<ImportReport>
    where
        F: FnMut(f64),
    {
        let session = self.current.as_ref().ok_or(ProjectError::NoProjectUrl)?;
        let policy = read_session(session).manifest().media_policy;
        self.media.import_media(sources, session, policy, cancel, on_progress)
    }

    pub fn collect_all_media(&self) -> Result<CollectReport> {
        let session = self.current.as_ref().ok_or(ProjectError::NoProjectUrl)?;
        self.media.collect_all_media(session)
    }

    /// Relink reference `id` of the current project to `new_path`.
    pub fn relink_media(&self, id: Uuid, new_path: &Path) -> Result<MediaReference> {
        let session = self.current.as_ref().ok_or(ProjectError::NoProjectUrl)?;
        let reference = read_session(session)
            .media_reference(id)
            .cloned()
            .ok_or_else(|| ProjectError::import_failed(new_path, format!("no media reference {}", id)))?;

        let relinked = self.media.relink_media(&reference, new_path)?;
        let stored = relinked.clone();
        write_session(session).update_media_reference(id, move |r| *r = stored);
        Ok(relinked)
    }

    // === Status ===

    pub fn current_session(&self) -> Option<&SharedSession> {
        self.current.as_ref()
    }

    pub fn has_open_project(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.current.as_ref().is_some_and(|s| read_session(s).is_dirty())
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.current.as_ref().and_then(|s| read_session(s).last_saved_at())
    }

    pub fn is_auto_save_armed(&self) -> bool {
        self.autosave.as_ref().is_some_and(AutoSave::is_running)
    }

    fn current_package_path(&self) -> Result<PathBuf> {
        let session = self.current.as_ref().ok_or(ProjectError::NoProjectUrl)?;
        read_session(session)
            .package_path()
            .map(Path::to_path_buf)
            .ok_or(ProjectError::NoProjectUrl)
    }
}

fn same_package(a: &Path, b: &Path) -> bool {
    let canonical = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    canonical(a) == canonical(b)
}

impl Drop for ProjectCoordinator {
    fn drop(&mut self) {
        self.close_current_project();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PackageFile;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn coordinator(tmp: &TempDir) -> ProjectCoordinator {
        let paths = PathConfig {
            config_dir: Some(tmp.path().join("cfg")),
        };
        let settings = Settings {
            background_workers: 1,
            ..Settings::default()
        };
        ProjectCoordinator::from_settings(&settings, &paths)
    }

    #[test]
    fn test_create_installs_session_and_arms_auto_save() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        assert!(!c.has_open_project());

        let session = c
            .create_new_project("Live", ProjectTemplate::TalkShow, MediaPolicy::Copy, tmp.path())
            .unwrap();
        assert!(c.has_open_project());
        assert!(c.is_auto_save_armed());
        assert!(Arc::ptr_eq(c.current_session().unwrap(), &session));
        assert!(!c.is_dirty());
        assert!(c.last_saved_at().is_some());
    }

    #[test]
    fn test_close_saves_dirty_session_and_unlocks() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        let session = c
            .create_new_project("Close", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .unwrap();
        let path = read_session(&session).package_path().unwrap().to_path_buf();
        write_session(&session).set_mixer(json!({ "audioBuses": [], "masterBusId": "bus-9" }));

        c.close_current_project();
        assert!(!c.has_open_project());
        assert!(!c.is_auto_save_armed());
        assert!(!c.store().is_locked(&path));

        let mixer: serde_json::Value =
            serde_json::from_slice(&fs::read(PackageFile::Mixer.path_in(&path)).unwrap()).unwrap();
        assert_eq!(mixer["masterBusId"], "bus-9");
    }

    #[test]
    fn test_close_swallows_save_failure() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        let session = c
            .create_new_project("Doomed", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .unwrap();
        let path = read_session(&session).package_path().unwrap().to_path_buf();
        write_session(&session).set_title("Changed");
        assert!(c.store().background().wait_idle(Duration::from_secs(5)));
        fs::remove_dir_all(&path).unwrap();

        c.close_current_project();
        assert!(!c.has_open_project());
    }

    #[test]
    fn test_save_without_project_fails() {
        let tmp = TempDir::new().unwrap();
        let c = coordinator(&tmp);
        assert!(matches!(c.save_current_project(), Err(ProjectError::NoProjectUrl)));
        assert!(matches!(
            c.import_media(&[], &CancelToken::new(), |_| {}),
            Err(ProjectError::NoProjectUrl)
        ));
    }

    #[test]
    fn test_open_replaces_current_project() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        let first = c
            .create_new_project("First", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .unwrap();
        let first_path = read_session(&first).package_path().unwrap().to_path_buf();
        c.create_new_project("Second", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .unwrap();
        assert!(!c.store().is_locked(&first_path));

        let reopened = c.open_project(&first_path).unwrap();
        assert_eq!(read_session(&reopened).manifest().title, "First");
        assert!(c.store().is_locked(&first_path));
        assert!(c.is_auto_save_armed());
    }

    #[test]
    fn test_failed_open_keeps_current_project() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        let keep = c
            .create_new_project("Keep", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .unwrap();
        let keep_path = read_session(&keep).package_path().unwrap().to_path_buf();
        write_session(&keep).set_title("Keep edited");

        let err = c.open_project(&tmp.path().join("Missing.vvproj")).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidPackageStructure(_)));
        assert!(c.has_open_project());
        assert!(Arc::ptr_eq(c.current_session().unwrap(), &keep));
        assert!(c.is_auto_save_armed());
        assert!(c.is_dirty());
        assert!(c.store().is_locked(&keep_path));

        assert!(c
            .create_new_project("Keep", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .is_err());
        assert!(Arc::ptr_eq(c.current_session().unwrap(), &keep));
        assert!(c.is_auto_save_armed());
    }

    #[test]
    fn test_reopen_current_project_keeps_lock_and_edits() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        let first = c
            .create_new_project("Again", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .unwrap();
        let path = read_session(&first).package_path().unwrap().to_path_buf();
        write_session(&first).set_title("Again edited");

        let reopened = c.open_project(&path).unwrap();
        assert!(!Arc::ptr_eq(&first, &reopened));
        assert_eq!(read_session(&reopened).manifest().title, "Again edited");
        assert!(c.store().is_locked(&path));
        assert!(c.is_auto_save_armed());
    }

    #[test]
    fn test_duplicate_registers_new_title_in_recent_list() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        c.create_new_project("Orig", ProjectTemplate::Blank, MediaPolicy::Copy, tmp.path())
            .unwrap();
        c.duplicate_current_project("Dup", None).unwrap();
        assert!(c.store().background().wait_idle(Duration::from_secs(5)));

        let recent = RecentProjects::new(tmp.path().join("cfg").join(RECENT_FILE), 10).load();
        let titled = |path: &Path| {
            let path = fs::canonicalize(path).unwrap();
            recent.iter().find(|e| e.path == path).map(|e| e.title.clone())
        };
        assert_eq!(titled(&tmp.path().join("Dup.vvproj")).as_deref(), Some("Dup"));
        assert_eq!(titled(&tmp.path().join("Orig.vvproj")).as_deref(), Some("Orig"));
        assert_eq!(recent[0].title, "Dup");
    }

    #[test]
    fn test_duplicate_saves_source_and_switches() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        let source = c
            .create_new_project("Base", ProjectTemplate::Gaming, MediaPolicy::Copy, tmp.path())
            .unwrap();
        let source_path = read_session(&source).package_path().unwrap().to_path_buf();
        write_session(&source).set_effects(json!({ "chains": [{ "id": "fx-1" }] }));

        let copy = c.duplicate_current_project("Base Copy", None).unwrap();
        let s = read_session(&copy);
        assert_eq!(s.manifest().title, "Base Copy");
        assert_eq!(s.effects()["chains"][0]["id"], "fx-1");
        assert_eq!(s.package_path(), Some(tmp.path().join("Base Copy.vvproj").as_path()));
        drop(s);

        assert!(!read_session(&source).is_dirty());
        assert!(!c.store().is_locked(&source_path));
        assert!(Arc::ptr_eq(c.current_session().unwrap(), &copy));
    }

    #[test]
    fn test_import_uses_project_policy_and_forwards_progress() {
        let tmp = TempDir::new().unwrap();
        let mut c = coordinator(&tmp);
        c.create_new_project("Media", ProjectTemplate::Blank, MediaPolicy::Link, tmp.path())
            .unwrap();
        let still = tmp.path().join("still.png");
        fs::write(&still, b"png").unwrap();

        let mut progress = Vec::new();
        let report = c
            .import_media(&[still.clone()], &CancelToken::new(), |p| progress.push(p))
            .unwrap();
        assert_eq!(progress, vec![1.0]);
        assert!(report.imported[0].is_linked);
        assert!(c.is_dirty());

        let id = report.imported[0].id;
        let moved = tmp.path().join("moved.png");
        fs::rename(&still, &moved).unwrap();
        let relinked = c.relink_media(id, &moved).unwrap();
        let s = read_session(c.current_session().unwrap());
        assert_eq!(s.media_reference(id), Some(&relinked));
        drop(s);

        let report = c.collect_all_media().unwrap();
        assert_eq!(report.collected, vec![id]);
        let s = read_session(c.current_session().unwrap());
        assert_eq!(s.manifest().media_policy, MediaPolicy::Copy);
        assert!(!s.media_reference(id).unwrap().is_linked);
    }
}
