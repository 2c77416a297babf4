//! Manifest: project identity, schema version and media policy.
//!
//! Stored as `manifest.json` at the package root. Timestamps are RFC 3339
//! (ISO 8601) in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProjectError, Result};

/// Schema written by this build.
///
/// History:
/// - 1: initial layout, no `mediaPolicy` (implicitly copy)
/// - 2: explicit `mediaPolicy`
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// How imported media is referenced by the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaPolicy {
    /// Bytes are duplicated into the package `media/` directory.
    #[default]
    Copy,
    /// External file referenced by bookmark plus absolute path.
    Link,
}

impl MediaPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaPolicy::Copy => "copy",
            MediaPolicy::Link => "link",
        }
    }
}

impl fmt::Display for MediaPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(MediaPolicy::Copy),
            "link" => Ok(MediaPolicy::Link),
            other => Err(format!("unknown media policy '{}' (expected copy|link)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    pub project_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub media_policy: MediaPolicy,
}

impl Manifest {
    pub fn new(title: &str, media_policy: MediaPolicy) -> Self {
        let now = Utc::now();
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            project_id: Uuid::new_v4(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            app_version: APP_VERSION.to_string(),
            media_policy,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Bring an older manifest up to [`CURRENT_SCHEMA_VERSION`].
    ///
    /// Returns `true` if anything changed. Running it again on a migrated
    /// manifest is a no-op. Manifests from a newer build are rejected.
    pub fn migrate(&mut self) -> Result<bool> {
        if self.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(ProjectError::UnsupportedSchemaVersion(self.schema_version));
        }
        if self.schema_version == CURRENT_SCHEMA_VERSION {
            return Ok(false);
        }

        log::info!(
            "Migrating manifest {} from schema {} to {}",
            self.project_id,
            self.schema_version,
            CURRENT_SCHEMA_VERSION
        );
        // v1 -> v2: mediaPolicy already defaulted to copy by serde
        self.schema_version = CURRENT_SCHEMA_VERSION;
        self.app_version = APP_VERSION.to_string();
        self.touch();
        Ok(true)
    }

    /// Give the manifest a fresh identity (used by duplicate).
    pub fn reidentify(&mut self, title: &str) {
        let now = Utc::now();
        self.project_id = Uuid::new_v4();
        self.title = title.to_string();
        self.created_at = now;
        self.updated_at = now;
        self.app_version = APP_VERSION.to_string();
    }
}
