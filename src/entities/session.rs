//! ProjectSession: the in-memory project document.
//!
//! Holds the manifest, the four component documents (timeline, routing,
//! mixer, effects) as opaque JSON, and the ordered media collection.
//! Every mutation marks the session dirty, bumps `revision` and touches
//! `manifest.updatedAt`.
//!
//! Sessions are shared between the UI and the auto-save loop as
//! [`SharedSession`] (`Arc<RwLock<_>>`).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::manifest::{Manifest, MediaPolicy};
use super::media_ref::MediaReference;
use super::templates::ProjectTemplate;

pub type SharedSession = Arc<RwLock<ProjectSession>>;

/// Read access that survives a panicked writer (the document stays usable).
pub fn read_session(shared: &SharedSession) -> RwLockReadGuard<'_, ProjectSession> {
    shared.read().unwrap_or_else(|e| e.into_inner())
}

pub fn write_session(shared: &SharedSession) -> RwLockWriteGuard<'_, ProjectSession> {
    shared.write().unwrap_or_else(|e| e.into_inner())
}

/// The four opaque component documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Components {
    pub timeline: Value,
    pub routing: Value,
    pub mixer: Value,
    pub effects: Value,
}

/// Immutable copy of everything a save needs to serialize.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub manifest: Manifest,
    pub components: Components,
    pub media: Vec<MediaReference>,
    pub revision: u64,
}

#[derive(Debug, Clone)]
pub struct ProjectSession {
    manifest: Manifest,
    components: Components,
    media: Vec<MediaReference>,
    /// Package directory, `None` until the project lives on disk
    package_path: Option<PathBuf>,
    dirty: bool,
    last_saved_at: Option<DateTime<Utc>>,
    auto_save_enabled: bool,
    /// Bumped on every mutation; lets a save tell whether it is still current
    revision: u64,
}

impl ProjectSession {
    /// Session for documents loaded from disk (starts clean).
    pub fn new(
        manifest: Manifest,
        components: Components,
        media: Vec<MediaReference>,
        package_path: Option<PathBuf>,
    ) -> Self {
        Self {
            manifest,
            components,
            media,
            package_path,
            dirty: false,
            last_saved_at: None,
            auto_save_enabled: true,
            revision: 0,
        }
    }

    /// Fresh, unsaved session populated from a template.
    pub fn from_template(title: &str, template: ProjectTemplate, media_policy: MediaPolicy) -> Self {
        let mut session = Self::new(
            Manifest::new(title, media_policy),
            template.components(),
            Vec::new(),
            None,
        );
        session.dirty = true;
        session
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    // === Read access ===

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn timeline(&self) -> &Value {
        &self.components.timeline
    }

    pub fn routing(&self) -> &Value {
        &self.components.routing
    }

    pub fn mixer(&self) -> &Value {
        &self.components.mixer
    }

    pub fn effects(&self) -> &Value {
        &self.components.effects
    }

    pub fn media(&self) -> &[MediaReference] {
        &self.media
    }

    pub fn media_reference(&self, id: Uuid) -> Option<&MediaReference> {
        self.media.iter().find(|r| r.id == id)
    }

    pub fn package_path(&self) -> Option<&Path> {
        self.package_path.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn auto_save_enabled(&self) -> bool {
        self.auto_save_enabled
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            manifest: self.manifest.clone(),
            components: self.components.clone(),
            media: self.media.clone(),
            revision: self.revision,
        }
    }

    // === Mutators (all mark dirty) ===

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
        self.manifest.touch();
    }

    pub fn set_timeline(&mut self, value: Value) {
        self.components.timeline = value;
        self.mark_dirty();
    }

    pub fn set_routing(&mut self, value: Value) {
        self.components.routing = value;
        self.mark_dirty();
    }

    pub fn set_mixer(&mut self, value: Value) {
        self.components.mixer = value;
        self.mark_dirty();
    }

    pub fn set_effects(&mut self, value: Value) {
        self.components.effects = value;
        self.mark_dirty();
    }

    pub fn set_title(&mut self, title: &str) {
        self.manifest.title = title.to_string();
        self.mark_dirty();
    }

    pub fn set_media_policy(&mut self, policy: MediaPolicy) {
        self.manifest.media_policy = policy;
        self.mark_dirty();
    }

    /// New project identity with `title` (duplicate).
    pub fn reidentify(&mut self, title: &str) {
        self.manifest.reidentify(title);
        self.mark_dirty();
    }

    pub fn add_media_reference(&mut self, reference: MediaReference) {
        self.media.push(reference);
        self.mark_dirty();
    }

    pub fn remove_media_reference(&mut self, id: Uuid) -> Option<MediaReference> {
        let index = self.media.iter().position(|r| r.id == id)?;
        let removed = self.media.remove(index);
        self.mark_dirty();
        Some(removed)
    }

    /// Mutate a reference in place. Returns `false` if `id` is unknown.
    pub fn update_media_reference<F>(&mut self, id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut MediaReference),
    {
        let Some(reference) = self.media.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        f(reference);
        self.mark_dirty();
        true
    }

    /// Replace components and media wholesale (version restore).
    pub fn replace_contents(&mut self, components: Components, media: Vec<MediaReference>) {
        self.components = components;
        self.media = media;
        self.mark_dirty();
    }

    // === Persistence state (not document mutations) ===

    pub fn set_package_path(&mut self, path: Option<PathBuf>) {
        self.package_path = path;
    }

    pub fn set_auto_save_enabled(&mut self, enabled: bool) {
        self.auto_save_enabled = enabled;
    }

    /// Clear dirty after a fresh load.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
        self.last_saved_at = Some(Utc::now());
    }

    /// Record a committed save of `revision`. Edits made while the save was
    /// running keep the session dirty. Returns whether the session is clean.
    pub fn mark_saved_revision(&mut self, revision: u64) -> bool {
        self.last_saved_at = Some(Utc::now());
        if self.revision == revision {
            self.dirty = false;
        }
        !self.dirty
    }
}
