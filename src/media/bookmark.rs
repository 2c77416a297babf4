//! Bookmarks: durable references to media outside the package.
//!
//! [`BookmarkProvider`] is the seam for a platform capability store. The
//! default [`PathBookmarks`] encodes the canonical path plus the file's
//! size and modification time; a bookmark resolves as stale once the file
//! changed, and fails once it is gone.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBookmark {
    pub path: PathBuf,
    pub is_stale: bool,
}

pub trait BookmarkProvider: Send + Sync {
    /// Issue a token for `path`. Must survive process restarts.
    fn issue(&self, path: &Path) -> Result<String>;

    /// Resolve a token back to a path.
    fn resolve(&self, token: &str) -> Result<ResolvedBookmark>;
}

const TOKEN_PREFIX: &str = "vvbm1:";

#[derive(Debug, Serialize, Deserialize)]
struct BookmarkData {
    path: PathBuf,
    len: u64,
    modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PathBookmarks;

fn file_identity(path: &Path) -> Result<(u64, Option<DateTime<Utc>>)> {
    let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let modified = meta.modified().ok().map(DateTime::<Utc>::from);
    Ok((meta.len(), modified))
}

impl BookmarkProvider for PathBookmarks {
    fn issue(&self, path: &Path) -> Result<String> {
        let path = fs::canonicalize(path).with_context(|| format!("resolve {}", path.display()))?;
        let (len, modified) = file_identity(&path)?;
        let data = serde_json::to_vec(&BookmarkData { path, len, modified })?;
        Ok(format!("{}{}", TOKEN_PREFIX, STANDARD.encode(data)))
    }

    fn resolve(&self, token: &str) -> Result<ResolvedBookmark> {
        let payload = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| anyhow!("unrecognized bookmark format"))?;
        let bytes = STANDARD.decode(payload).context("corrupt bookmark")?;
        let data: BookmarkData = serde_json::from_slice(&bytes).context("corrupt bookmark")?;

        if !data.path.is_file() {
            bail!("bookmarked file {} no longer exists", data.path.display());
        }
        let (len, modified) = file_identity(&data.path)?;
        Ok(ResolvedBookmark {
            is_stale: len != data.len || modified != data.modified,
            path: data.path,
        })
    }
}
