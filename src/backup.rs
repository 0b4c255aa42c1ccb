//! Backup manager: snapshot a target file before anything mutates it.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::hasher::{ContentHash, hash_bytes};

/// Record of one snapshot written during a run.
#[derive(Debug, Clone)]
pub struct BackupHandle {
    /// Where the snapshot was written.
    pub backup: PathBuf,
    /// Digest of the snapshot bytes.
    pub hash: ContentHash,
    /// File that was snapshotted.
    pub original: PathBuf,
}

/// Writes snapshots into one directory, named `<file name>.bak`.
/// Tracks names used in the current run so collisions are reported.
pub struct BackupManager {
    dir: PathBuf,
    used: HashSet<OsString>,
}

impl BackupManager {
    /// Copy `path` byte-for-byte to `<dir>/<file name>.bak`, creating the
    /// directory on first use. A second backup with the same file name in one
    /// run replaces the first.
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingFile` if `path` does not exist, or `Error::Io` if the
    /// source cannot be read or the snapshot cannot be written.
    pub fn backup(&mut self, path: &Path) -> Result<BackupHandle, Error> {
        let bytes = match std::fs::read(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingFile { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(b) => b,
        };

        let name = backup_name_for(path);
        if !self.used.insert(name.clone()) {
            tracing::warn!(
                file = %path.display(),
                backup = ?name,
                "backup name collides with an earlier target in this run; overwriting"
            );
        }

        std::fs::create_dir_all(&self.dir)?;
        let backup = self.dir.join(&name);
        std::fs::write(&backup, &bytes)?;

        let hash = hash_bytes(&bytes);
        tracing::info!(file = %path.display(), backup = %backup.display(), hash = hash.short(), "backed up");

        return Ok(BackupHandle {
            backup,
            hash,
            original: path.to_path_buf(),
        });
    }

    /// Manager writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        return Self {
            dir: dir.into(),
            used: HashSet::new(),
        };
    }
}

/// `index.html` becomes `index.html.bak`.
fn backup_name_for(path: &Path) -> OsString {
    let mut name = path.file_name().map(OsString::from).unwrap_or_else(|| return OsString::from("unnamed"));
    name.push(".bak");
    return name;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test code")]
mod tests {
    use super::*;

    #[test]
    fn snapshot_matches_source_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("app.js");
        std::fs::write(&src, "function loadDrug(id) { }\n").unwrap();

        let mut manager = BackupManager::new(tmp.path().join("_backups"));
        let handle = manager.backup(&src).unwrap();

        assert_eq!(handle.backup, tmp.path().join("_backups").join("app.js.bak"));
        assert_eq!(std::fs::read(&handle.backup).unwrap(), std::fs::read(&src).unwrap());
        assert_eq!(handle.hash, hash_bytes(b"function loadDrug(id) { }\n"));
    }

    #[test]
    fn missing_source_is_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut manager = BackupManager::new(tmp.path().join("_backups"));
        let err = manager.backup(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::MissingFile { .. }));
        assert!(!tmp.path().join("_backups").exists());
    }

    #[test]
    fn same_name_in_one_run_keeps_last_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("a")).unwrap();
        std::fs::create_dir_all(tmp.path().join("b")).unwrap();
        std::fs::write(tmp.path().join("a/app.js"), "first").unwrap();
        std::fs::write(tmp.path().join("b/app.js"), "second").unwrap();

        let mut manager = BackupManager::new(tmp.path().join("_backups"));
        manager.backup(&tmp.path().join("a/app.js")).unwrap();
        let last = manager.backup(&tmp.path().join("b/app.js")).unwrap();

        assert_eq!(std::fs::read_to_string(last.backup).unwrap(), "second");
    }
}
