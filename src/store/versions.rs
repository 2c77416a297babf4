//! Version snapshots under `.versions/`.
//!
//! A snapshot copies the on-disk json files as they were before a save.
//! It is built in `.versions/.staging-<task>` and only renamed to
//! `v<N>_<timestamp>` once the save commits, so cancelled or failed saves
//! never leave a half-made version behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, trace, warn};

use super::package::{PackageFile, VERSIONS_DIR};

pub const DEFAULT_RETENTION: usize = 50;

pub(crate) const STAGING_PREFIX: &str = ".staging-";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub number: u64,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
}

pub fn versions_dir(root: &Path) -> PathBuf {
    root.join(VERSIONS_DIR)
}

/// `v<N>_<ISO 8601 basic UTC>`, e.g. `v7_20261017T101502.123Z`
pub fn dir_name(number: u64, created_at: DateTime<Utc>) -> String {
    format!("v{}_{}", number, created_at.format(STAMP_FORMAT))
}

pub fn parse_dir_name(name: &str) -> Option<(u64, DateTime<Utc>)> {
    let (number, stamp) = name.strip_prefix('v')?.split_once('_')?;
    let number = number.parse().ok()?;
    let stamp = stamp.strip_suffix('Z')?;
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S%.f").ok()?;
    Some((number, naive.and_utc()))
}

/// Committed snapshots, oldest first.
pub fn list(root: &Path) -> io::Result<Vec<VersionInfo>> {
    let dir = versions_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut versions = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some((number, created_at)) = name.to_str().and_then(parse_dir_name) else {
            continue;
        };
        versions.push(VersionInfo {
            number,
            created_at,
            path: entry.path(),
        });
    }
    versions.sort_by(|a, b| (a.created_at, a.number).cmp(&(b.created_at, b.number)));
    Ok(versions)
}

pub fn highest_number(root: &Path) -> u64 {
    match list(root) {
        Ok(versions) => versions.iter().map(|v| v.number).max().unwrap_or(0),
        Err(e) => {
            warn!("Could not scan versions of {}: {}", root.display(), e);
            0
        }
    }
}

/// Copy the current on-disk json files into a fresh staging directory.
/// Files that don't exist yet are skipped.
pub fn stage(root: &Path, task_id: u64) -> io::Result<PathBuf> {
    let staging = versions_dir(root).join(format!("{}{}", STAGING_PREFIX, task_id));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    for file in PackageFile::ALL {
        let source = file.path_in(root);
        if source.is_file() {
            fs::copy(&source, file.path_in(&staging))?;
        }
    }
    trace!("Staged snapshot {}", staging.display());
    Ok(staging)
}

/// Promote a staging directory to a numbered version.
pub fn commit(staging: &Path, root: &Path, number: u64) -> io::Result<VersionInfo> {
    let created_at = Utc::now();
    let path = versions_dir(root).join(dir_name(number, created_at));
    fs::rename(staging, &path)?;
    Ok(VersionInfo {
        number,
        created_at,
        path,
    })
}

/// [`commit`], discarding the staging directory if the rename fails.
pub fn commit_or_discard(staging: &Path, root: &Path, number: u64) -> Option<VersionInfo> {
    match commit(staging, root, number) {
        Ok(version) => {
            trace!("Committed version {}", version.path.display());
            Some(version)
        }
        Err(e) => {
            warn!("Could not commit snapshot {}: {}", staging.display(), e);
            discard(staging);
            None
        }
    }
}

pub fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove snapshot staging {}: {}", staging.display(), e);
        }
    }
}

/// Remove leftovers of saves interrupted by a crash.
pub fn cleanup_staging(root: &Path) {
    let Ok(entries) = fs::read_dir(versions_dir(root)) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            debug!("Removing stale snapshot staging {}", entry.path().display());
            discard(&entry.path());
        }
    }
}

/// Keep the `keep` most recent versions, delete the rest oldest first.
pub fn prune(root: &Path, keep: usize) -> io::Result<Vec<PathBuf>> {
    let versions = list(root)?;
    if versions.len() <= keep {
        return Ok(Vec::new());
    }
    let excess = versions.len() - keep;
    let mut removed = Vec::with_capacity(excess);
    for version in versions.into_iter().take(excess) {
        fs::remove_dir_all(&version.path)?;
        trace!("Pruned version {}", version.path.display());
        removed.push(version.path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_dir_name_roundtrip() {
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 10, 15, 2).unwrap()
            + chrono::Duration::milliseconds(123);
        let name = dir_name(7, at);
        assert_eq!(name, "v7_20261017T101502.123Z");
        assert_eq!(parse_dir_name(&name), Some((7, at)));
        assert_eq!(parse_dir_name(".staging-3"), None);
        assert_eq!(parse_dir_name("vx_20261017T101502.123Z"), None);
    }

    #[test]
    fn test_stage_skips_missing_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir(versions_dir(root)).unwrap();
        fs::write(root.join("manifest.json"), b"{\"a\":1}").unwrap();

        let staging = stage(root, 1).unwrap();
        assert!(staging.join("manifest.json").is_file());
        assert!(!staging.join("timeline.json").exists());

        // Staging dirs are not versions until committed
        assert!(list(root).unwrap().is_empty());
        let info = commit(&staging, root, 1).unwrap();
        assert_eq!(list(root).unwrap(), vec![info]);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir(versions_dir(root)).unwrap();
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        for n in 1..=5u64 {
            let at = base + chrono::Duration::seconds(n as i64);
            fs::create_dir(versions_dir(root).join(dir_name(n, at))).unwrap();
        }

        let removed = prune(root, 3).unwrap();
        assert_eq!(removed.len(), 2);
        let left: Vec<u64> = list(root).unwrap().iter().map(|v| v.number).collect();
        assert_eq!(left, vec![3, 4, 5]);
        assert_eq!(highest_number(root), 5);
    }

    #[test]
    fn test_failed_commit_discards_staging() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("pkg");
        fs::create_dir(&root).unwrap();
        let staging = tmp.path().join(".staging-4");
        fs::create_dir(&staging).unwrap();
        fs::write(staging.join("manifest.json"), b"{}").unwrap();

        // No .versions directory to rename into
        assert_eq!(commit_or_discard(&staging, &root, 1), None);
        assert!(!staging.exists());
        assert!(list(&root).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_staging() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(versions_dir(root).join(".staging-9")).unwrap();
        cleanup_staging(root);
        assert!(!versions_dir(root).join(".staging-9").exists());
    }
}
