//! Staging journal backing the load transaction.
//!
//! Every object a load removes is *moved* into a staging directory inside
//! the store root rather than deleted, and every creation or restore is
//! recorded. On success the staging directory is dropped; on failure the
//! journal is replayed in reverse so the filesystem and lock return to
//! their pre-load state.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::fsutil;
use crate::store::lock::Lock;
use crate::store::Store;

#[derive(Debug)]
enum Action {
    /// An object was moved out of `original` into `staged`.
    Staged { original: PathBuf, staged: PathBuf },
    /// A backup object was copied to `path`.
    Restored { path: PathBuf },
    /// A new object was materialized at `path`.
    Created { path: PathBuf },
    /// A missing parent directory was created at `path`.
    CreatedDir { path: PathBuf },
    /// An auto-created directory was removed from `path`.
    RemovedDir { path: PathBuf },
}

/// Undo log for one load invocation.
#[derive(Debug)]
pub(crate) struct TxnJournal {
    stage_root: PathBuf,
    actions: Vec<Action>,
    next_id: usize,
}

impl TxnJournal {
    /// Create the staging directory under the store root.
    pub fn begin(store_root: &Path) -> Result<Self, StoreError> {
        let stage_root = store_root.join(format!("txn-{}", std::process::id()));
        // A leftover directory from a crashed run under the same pid is
        // stale; its contents were already abandoned.
        fsutil::remove_path(&stage_root)?;
        fs::create_dir_all(&stage_root).map_err(|e| {
            StoreError::io(
                format!("create staging directory {}", stage_root.display()),
                e,
            )
        })?;

        Ok(Self {
            stage_root,
            actions: Vec::new(),
            next_id: 0,
        })
    }

    /// Move the object at `path` into the staging area instead of deleting
    /// it, so it can be put back by [`rollback`](Self::rollback).
    pub fn stage_removal(&mut self, path: &Path) -> Result<(), StoreError> {
        let staged = self.stage_root.join(self.next_id.to_string());
        self.next_id += 1;

        fsutil::rename_or_copy(path, &staged)?;
        self.actions.push(Action::Staged {
            original: path.to_path_buf(),
            staged,
        });
        Ok(())
    }

    /// Record a backup restore at `path`.
    pub fn record_restored(&mut self, path: &Path) {
        self.actions.push(Action::Restored {
            path: path.to_path_buf(),
        });
    }

    /// Record a newly materialized object at `path`.
    pub fn record_created(&mut self, path: &Path) {
        self.actions.push(Action::Created {
            path: path.to_path_buf(),
        });
    }

    /// Record a newly created parent directory at `path`.
    pub fn record_created_dir(&mut self, path: &Path) {
        self.actions.push(Action::CreatedDir {
            path: path.to_path_buf(),
        });
    }

    /// Record the removal of an auto-created directory at `path`.
    pub fn record_removed_dir(&mut self, path: &Path) {
        self.actions.push(Action::RemovedDir {
            path: path.to_path_buf(),
        });
    }

    /// Drop the staging area after a successful load.
    pub fn commit(self) -> Result<(), StoreError> {
        fsutil::remove_path(&self.stage_root)?;
        Ok(())
    }

    /// Replay the journal in reverse: remove created objects and
    /// directories, undo restores, move staged objects back, and re-persist
    /// the pre-load lock.
    pub fn rollback(self, store: &Store, previous_lock: &Lock) -> Result<(), StoreError> {
        tracing::warn!(actions = self.actions.len(), "rolling back failed load");

        for action in self.actions.iter().rev() {
            match action {
                Action::Created { path } | Action::Restored { path } => {
                    fsutil::remove_path(path)?;
                }
                Action::CreatedDir { path } => {
                    // Created parent dirs are empty once their contents are
                    // rolled back; tolerate anything else living there.
                    match fs::remove_dir(path) {
                        Ok(()) => {}
                        Err(e)
                            if matches!(
                                e.kind(),
                                std::io::ErrorKind::NotFound
                                    | std::io::ErrorKind::DirectoryNotEmpty
                            ) => {}
                        Err(e) => {
                            return Err(StoreError::io(
                                format!("remove created directory {}", path.display()),
                                e,
                            ));
                        }
                    }
                }
                Action::RemovedDir { path } => {
                    fs::create_dir_all(path).map_err(|e| {
                        StoreError::io(format!("recreate directory {}", path.display()), e)
                    })?;
                }
                Action::Staged { original, staged } => {
                    if let Some(parent) = original.parent() {
                        fs::create_dir_all(parent).map_err(|e| {
                            StoreError::io(
                                format!("recreate parent directory {}", parent.display()),
                                e,
                            )
                        })?;
                    }
                    fsutil::rename_or_copy(staged, original)?;
                }
            }
        }

        store.save_lock(previous_lock)?;
        fsutil::remove_path(&self.stage_root)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn installed_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let store = Store::new(tmp.path().join("store"));
        store.install().expect("install store");
        (tmp, store)
    }

    #[test]
    fn commit_drops_staging_directory() {
        let (tmp, store) = installed_store();
        let victim = tmp.path().join("victim");
        fs::write(&victim, b"bytes").unwrap();

        let mut journal = TxnJournal::begin(store.root()).unwrap();
        journal.stage_removal(&victim).unwrap();
        assert!(!victim.exists());

        journal.commit().unwrap();
        let leftovers = fs::read_dir(store.root())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("txn-")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn rollback_restores_staged_and_removes_created() {
        let (tmp, store) = installed_store();
        let old_lock = store.load_lock().unwrap();

        let victim = tmp.path().join("victim.txt");
        fs::write(&victim, b"original").unwrap();
        let created = tmp.path().join("made").join("new.txt");

        let mut journal = TxnJournal::begin(store.root()).unwrap();
        journal.stage_removal(&victim).unwrap();
        fs::create_dir(tmp.path().join("made")).unwrap();
        journal.record_created_dir(&tmp.path().join("made"));
        fs::write(&created, b"fresh").unwrap();
        journal.record_created(&created);

        journal.rollback(&store, &old_lock).unwrap();

        assert_eq!(fs::read(&victim).unwrap(), b"original");
        assert!(!created.exists());
        assert!(!tmp.path().join("made").exists());
    }

    #[test]
    fn rollback_recreates_removed_dirs_before_unstaging() {
        let (tmp, store) = installed_store();
        let old_lock = store.load_lock().unwrap();

        let nest = tmp.path().join("nest");
        let inner = nest.join("file.txt");
        fs::create_dir(&nest).unwrap();
        fs::write(&inner, b"deep").unwrap();

        let mut journal = TxnJournal::begin(store.root()).unwrap();
        journal.stage_removal(&inner).unwrap();
        fs::remove_dir(&nest).unwrap();
        journal.record_removed_dir(&nest);

        journal.rollback(&store, &old_lock).unwrap();
        assert_eq!(fs::read(&inner).unwrap(), b"deep");
    }

    #[cfg(unix)]
    #[test]
    fn staging_preserves_symlinks() {
        let (tmp, store) = installed_store();
        let old_lock = store.load_lock().unwrap();

        let link = tmp.path().join("link");
        std::os::unix::fs::symlink("/target/somewhere", &link).unwrap();

        let mut journal = TxnJournal::begin(store.root()).unwrap();
        journal.stage_removal(&link).unwrap();
        journal.rollback(&store, &old_lock).unwrap();

        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("/target/somewhere")
        );
    }
}
