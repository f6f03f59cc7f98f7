//! Content-addressed backup object store.
//!
//! Objects an apply would otherwise destroy are preserved under
//! `backups/<digest-string>/object`, byte-identical to the original
//! (recursively, for directories). Keys are digests, not original paths:
//! identical prior contents at many paths share one object, so deletion is
//! deferred until no managed entry references the digest.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::digest::Digest;
use crate::error::{ConflictError, StoreError};
use crate::fsutil;
use crate::store::lock::TrackedObject;

/// File name of the payload inside each backup entry directory.
pub const OBJECT_FILE: &str = "object";

/// Handle to the backup objects directory of a store.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The backup objects directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage path of the object for a digest key.
    #[must_use]
    pub fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key).join(OBJECT_FILE)
    }

    /// Persist the object at `path` under its digest key and return a
    /// reference to the stored copy.
    ///
    /// An existing object under the same key is reused after a content
    /// recheck (digest equality is identity; a mismatch is a collision).
    /// New objects are copied under a temp name and published atomically.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero digest, a collision, a copy failure, or
    /// a stored object that fails its digest verification.
    pub fn persist(&self, path: &Path, digest: &Digest) -> Result<TrackedObject, StoreError> {
        if digest.is_zero() {
            return Err(StoreError::Other(anyhow!(
                "cannot back up {} with an empty digest",
                path.display()
            )));
        }

        let key = digest.to_string();
        let object_path = self.object_path(&key);

        if fs::symlink_metadata(&object_path).is_ok() {
            let existing = Digest::for_path(&object_path)?;
            if existing != *digest {
                return Err(ConflictError::BackupCollision {
                    key,
                    path: object_path,
                }
                .into());
            }
            tracing::debug!(key = %key, "reusing existing backup object");
            return Ok(TrackedObject {
                path: object_path,
                digest: digest.clone(),
            });
        }

        let entry_dir = self.root.join(&key);
        fs::create_dir_all(&entry_dir).map_err(|e| {
            StoreError::io(format!("create backup directory {}", entry_dir.display()), e)
        })?;

        let staged = entry_dir.join(".incoming");
        let _ = fsutil::remove_path(&staged);
        if let Err(e) = fsutil::copy_path(path, &staged) {
            let _ = fsutil::remove_path(&staged);
            return Err(StoreError::Other(e.context(format!(
                "back up {} into {}",
                path.display(),
                staged.display()
            ))));
        }

        // Verify before publishing; a bad copy must never become the object.
        let written = Digest::for_path(&staged)?;
        if written != *digest {
            let _ = fsutil::remove_path(&staged);
            return Err(ConflictError::BackupDigestMismatch { path: staged }.into());
        }

        if let Err(e) = fs::rename(&staged, &object_path) {
            let _ = fsutil::remove_path(&staged);
            return Err(StoreError::io(
                format!("publish backup object {}", object_path.display()),
                e,
            ));
        }

        tracing::debug!(key = %key, from = %path.display(), "persisted backup object");
        Ok(TrackedObject {
            path: object_path,
            digest: digest.clone(),
        })
    }

    /// Restore the backup referenced by `prev` to `destination`.
    ///
    /// Returns `true` when content was copied back. A missing backup or an
    /// occupied destination is fatal unless `force`; under `force` a missing
    /// backup is skipped and an occupied destination is removed first.
    ///
    /// # Errors
    ///
    /// Returns a [`ConflictError`] per the rules above, or an I/O error
    /// from the copy.
    pub fn restore(
        &self,
        prev: &TrackedObject,
        destination: &Path,
        force: bool,
    ) -> Result<bool, StoreError> {
        let backup_path = if prev.path.as_os_str().is_empty() {
            if prev.digest.is_zero() {
                return Ok(false);
            }
            self.object_path(&prev.digest.to_string())
        } else {
            prev.path.clone()
        };

        if fs::symlink_metadata(&backup_path).is_err() {
            if force {
                tracing::warn!(
                    backup = %backup_path.display(),
                    dest = %destination.display(),
                    "backup object missing; skipping restore under --force"
                );
                return Ok(false);
            }
            return Err(ConflictError::BackupMissing {
                backup: backup_path,
                dest: destination.to_path_buf(),
            }
            .into());
        }

        if !prev.digest.is_zero() {
            let stored = Digest::for_path(&backup_path)?;
            if stored != prev.digest && !force {
                return Err(ConflictError::BackupDigestMismatch { path: backup_path }.into());
            }
        }

        if fs::symlink_metadata(destination).is_ok() {
            if !force {
                return Err(ConflictError::RestoreDestinationExists {
                    dest: destination.to_path_buf(),
                }
                .into());
            }
            fsutil::remove_path(destination)?;
        }

        fsutil::copy_path(&backup_path, destination).map_err(|e| {
            StoreError::Other(e.context(format!(
                "restore backup {} to {}",
                backup_path.display(),
                destination.display()
            )))
        })?;

        tracing::debug!(
            backup = %backup_path.display(),
            dest = %destination.display(),
            "restored backup object"
        );
        Ok(true)
    }

    /// Remove every stored object whose key is not in `referenced`.
    ///
    /// Returns the removed entry directories. A missing backups directory
    /// sweeps nothing.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be read or an entry
    /// cannot be removed.
    pub fn sweep(&self, referenced: &BTreeSet<String>) -> Result<Vec<PathBuf>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::io(
                    format!("read backups directory {}", self.root.display()),
                    e,
                ));
            }
        };

        let mut removed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                StoreError::io(format!("read backups directory {}", self.root.display()), e)
            })?;
            let key = entry.file_name().to_string_lossy().into_owned();
            if referenced.contains(&key) {
                continue;
            }

            let path = entry.path();
            fsutil::remove_path(&path)?;
            tracing::debug!(key = %key, "removed unreferenced backup object");
            removed.push(path);
        }

        Ok(removed)
    }

    /// Enumerate stored keys: entries whose `object` payload exists, and
    /// broken entries whose payload is missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be read.
    pub fn scan(&self) -> Result<(BTreeSet<String>, Vec<String>), StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok((BTreeSet::new(), Vec::new()));
            }
            Err(e) => {
                return Err(StoreError::io(
                    format!("read backups directory {}", self.root.display()),
                    e,
                ));
            }
        };

        let mut present = BTreeSet::new();
        let mut broken = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                StoreError::io(format!("read backups directory {}", self.root.display()), e)
            })?;
            let key = entry.file_name().to_string_lossy().into_owned();
            let object = self.object_path(&key);

            match fs::symlink_metadata(&object) {
                Ok(_) => {
                    present.insert(key);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => broken.push(key),
                Err(e) => {
                    return Err(StoreError::io(
                        format!("stat backup object {}", object.display()),
                        e,
                    ));
                }
            }
        }
        broken.sort();

        Ok((present, broken))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_backups() -> (tempfile::TempDir, BackupStore) {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let store = BackupStore::new(tmp.path().join("backups"));
        (tmp, store)
    }

    fn write_sample(dir: &Path, content: &[u8]) -> (PathBuf, Digest) {
        let path = dir.join("sample.txt");
        fs::write(&path, content).unwrap();
        let digest = Digest::for_path(&path).unwrap();
        (path, digest)
    }

    #[test]
    fn persist_stores_object_under_digest_key() {
        let (tmp, backups) = temp_backups();
        let (path, digest) = write_sample(tmp.path(), b"content");

        let stored = backups.persist(&path, &digest).unwrap();
        assert_eq!(stored.path, backups.object_path(&digest.to_string()));
        assert_eq!(fs::read(&stored.path).unwrap(), b"content");
        assert_eq!(Digest::for_path(&stored.path).unwrap(), digest);
    }

    #[test]
    fn persist_deduplicates_identical_content() {
        let (tmp, backups) = temp_backups();
        let (path, digest) = write_sample(tmp.path(), b"same bytes");
        let other = tmp.path().join("other.txt");
        fs::write(&other, b"same bytes").unwrap();

        let first = backups.persist(&path, &digest).unwrap();
        let second = backups.persist(&other, &digest).unwrap();
        assert_eq!(first.path, second.path);

        let entries = fs::read_dir(backups.root()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn persist_detects_collision_on_corrupted_entry() {
        let (tmp, backups) = temp_backups();
        let (path, digest) = write_sample(tmp.path(), b"original");
        backups.persist(&path, &digest).unwrap();

        // Corrupt the stored object, then try to persist under the same key.
        fs::write(backups.object_path(&digest.to_string()), b"tampered").unwrap();
        let err = backups.persist(&path, &digest).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(ConflictError::BackupCollision { .. })
        ));
    }

    #[test]
    fn persist_rejects_zero_digest() {
        let (tmp, backups) = temp_backups();
        let (path, _) = write_sample(tmp.path(), b"x");
        assert!(backups.persist(&path, &Digest::zero()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn persist_preserves_directory_trees_and_symlinks() {
        let (tmp, backups) = temp_backups();
        let tree = tmp.path().join("tree");
        fs::create_dir_all(tree.join("sub")).unwrap();
        fs::write(tree.join("sub/f.txt"), b"data").unwrap();
        std::os::unix::fs::symlink("sub/f.txt", tree.join("ln")).unwrap();

        let digest = Digest::for_path(&tree).unwrap();
        let stored = backups.persist(&tree, &digest).unwrap();
        assert_eq!(Digest::for_path(&stored.path).unwrap(), digest);
        assert_eq!(
            fs::read_link(stored.path.join("ln")).unwrap(),
            PathBuf::from("sub/f.txt")
        );
    }

    #[test]
    fn restore_copies_object_back() {
        let (tmp, backups) = temp_backups();
        let (path, digest) = write_sample(tmp.path(), b"precious");
        let stored = backups.persist(&path, &digest).unwrap();
        fs::remove_file(&path).unwrap();

        let restored = backups.restore(&stored, &path, false).unwrap();
        assert!(restored);
        assert_eq!(fs::read(&path).unwrap(), b"precious");
    }

    #[test]
    fn restore_fails_on_occupied_destination_unless_forced() {
        let (tmp, backups) = temp_backups();
        let (path, digest) = write_sample(tmp.path(), b"precious");
        let stored = backups.persist(&path, &digest).unwrap();
        fs::write(&path, b"squatter").unwrap();

        let err = backups.restore(&stored, &path, false).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(ConflictError::RestoreDestinationExists { .. })
        ));

        assert!(backups.restore(&stored, &path, true).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"precious");
    }

    #[test]
    fn restore_fails_on_missing_backup_unless_forced() {
        let (tmp, backups) = temp_backups();
        let dest = tmp.path().join("dest");
        let missing = TrackedObject {
            path: backups.object_path("file:sha256:feed"),
            digest: Digest::parse("file:sha256:feed").unwrap(),
        };

        let err = backups.restore(&missing, &dest, false).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(ConflictError::BackupMissing { .. })
        ));

        // Forced restore of a missing backup is a no-op, not an error.
        assert!(!backups.restore(&missing, &dest, true).unwrap());
        assert!(!dest.exists());
    }

    #[test]
    fn sweep_removes_only_unreferenced_keys() {
        let (tmp, backups) = temp_backups();
        let (path_a, digest_a) = write_sample(tmp.path(), b"aaa");
        let other = tmp.path().join("bbb.txt");
        fs::write(&other, b"bbb").unwrap();
        let digest_b = Digest::for_path(&other).unwrap();

        backups.persist(&path_a, &digest_a).unwrap();
        backups.persist(&other, &digest_b).unwrap();

        let referenced: BTreeSet<String> = [digest_a.to_string()].into_iter().collect();
        let removed = backups.sweep(&referenced).unwrap();
        assert_eq!(removed.len(), 1);

        let (present, broken) = backups.scan().unwrap();
        assert!(present.contains(&digest_a.to_string()));
        assert!(!present.contains(&digest_b.to_string()));
        assert!(broken.is_empty());
    }

    #[test]
    fn sweep_of_missing_directory_is_noop() {
        let (_tmp, backups) = temp_backups();
        assert!(backups.sweep(&BTreeSet::new()).unwrap().is_empty());
    }

    #[test]
    fn scan_reports_broken_entries() {
        let (tmp, backups) = temp_backups();
        let (path, digest) = write_sample(tmp.path(), b"ok");
        backups.persist(&path, &digest).unwrap();

        // An entry directory without an object payload is broken.
        fs::create_dir_all(backups.root().join("file:sha256:dead")).unwrap();

        let (present, broken) = backups.scan().unwrap();
        assert!(present.contains(&digest.to_string()));
        assert_eq!(broken, vec!["file:sha256:dead".to_string()]);
    }
}
