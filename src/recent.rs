//! Recently used projects, most recent first.
//!
//! Stored as JSON in the data directory. Updated from the background queue
//! after create/open, so every failure here is logged by the queue and
//! never reaches the project operation that triggered it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::store::atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentProject {
    pub path: PathBuf,
    pub title: String,
    pub last_opened: DateTime<Utc>,
}

pub struct RecentProjects {
    file: PathBuf,
    limit: usize,
    // Serializes read-modify-write of the file
    lock: Mutex<()>,
}

impl RecentProjects {
    pub fn new(file: PathBuf, limit: usize) -> Self {
        Self {
            file,
            limit: limit.max(1),
            lock: Mutex::new(()),
        }
    }

    /// Current list. Unreadable files count as empty.
    pub fn load(&self) -> Vec<RecentProject> {
        let Ok(bytes) = fs::read(&self.file) else {
            return Vec::new();
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Ignoring corrupt recent projects list {}: {}", self.file.display(), e);
            Vec::new()
        })
    }

    /// Move `path` to the front of the list, dropping the oldest entries
    /// past the limit.
    pub fn register(&self, path: &Path, title: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let mut entries = self.load();
        entries.retain(|e| e.path != path);
        entries.insert(
            0,
            RecentProject {
                path: path.clone(),
                title: title.to_string(),
                last_opened: Utc::now(),
            },
        );
        entries.truncate(self.limit);

        self.write(&entries)?;
        trace!("Recent projects: {} ({} entries)", path.display(), entries.len());
        Ok(())
    }

    /// Drop `path` from the list. Returns whether it was there.
    pub fn forget(&self, path: &Path) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        let mut entries = self.load();
        let before = entries.len();
        entries.retain(|e| e.path != canonical && e.path != path);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(&entries)?;
        Ok(true)
    }

    fn write(&self, entries: &[RecentProject]) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        atomic::write_atomic(&self.file, &json)
            .with_context(|| format!("write {}", self.file.display()))
    }
}
