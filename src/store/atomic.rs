//! Atomic file replacement.
//!
//! Content goes to `<target>.tmp` first (flushed to disk), then a rename
//! swaps it over `<target>`. Readers see either the old or the new file,
//! never a partial one. Staging and committing are separate steps so a
//! multi-file save can stage everything before committing anything.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// `<target>.tmp`
pub fn tmp_path(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `bytes` to the temp sibling of `target` and sync it.
pub fn stage(target: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let tmp = tmp_path(target);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

/// Replace `target` with the staged file.
pub fn commit(tmp: &Path, target: &Path) -> io::Result<()> {
    fs::rename(tmp, target)
}

/// Drop a staged file that will not be committed.
pub fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        if e.kind() != io::ErrorKind::NotFound {
            log::debug!("Could not remove staged file {}: {}", tmp.display(), e);
        }
    }
}

/// Stage and commit in one go.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = stage(target, bytes)?;
    commit(&tmp, target).inspect_err(|_| discard(&tmp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/p/manifest.json")),
            PathBuf::from("/p/manifest.json.tmp")
        );
    }

    #[test]
    fn test_staged_file_invisible_until_commit() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("routing.json");
        fs::write(&target, b"old").unwrap();

        let staged = stage(&target, b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"old");

        commit(&staged, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!staged.exists());
    }

    #[test]
    fn test_discard_leaves_target_untouched() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("mixer.json");
        fs::write(&target, b"old").unwrap();

        let staged = stage(&target, b"new").unwrap();
        discard(&staged);
        assert!(!staged.exists());
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }

    #[test]
    fn test_write_atomic_creates_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a.json");
        write_atomic(&target, b"{}").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"{}");
        assert!(!tmp_path(&target).exists());
    }
}
