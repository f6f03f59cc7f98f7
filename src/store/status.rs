//! Status/drift scanning: tracked state vs. the live filesystem.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::digest::Digest;
use crate::error::StoreError;

use super::Store;
use super::lock::SourceRef;

/// One pass over the lock plus one scan of the backup store.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    /// Identity of the active source.
    pub source: SourceRef,
    /// Per-entry drift report, sorted by path.
    pub tracked: Vec<TrackedStatus>,
    /// Per-digest backup references, sorted by digest.
    pub backup_refs: Vec<BackupRefStatus>,
    /// Stored keys referenced by no entry, sorted.
    pub orphaned_backups: Vec<String>,
    /// Stored keys whose object payload is missing, sorted.
    pub broken_backups: Vec<String>,
}

/// Drift report for one managed entry.
#[derive(Debug, Clone)]
pub struct TrackedStatus {
    /// The managed path.
    pub path: PathBuf,
    /// Digest key of the entry's backup reference, if any.
    pub prev_digest: Option<String>,
    /// Whether that backup object is present in the store.
    pub backup_present: bool,
    /// Whether the live object diverges from the recorded digest.
    pub drifted: bool,
    /// Whether the object is gone from disk entirely.
    pub missing: bool,
}

/// Presence report for one referenced backup digest.
#[derive(Debug, Clone)]
pub struct BackupRefStatus {
    /// The digest key.
    pub digest: String,
    /// Managed paths referencing it, sorted.
    pub paths: Vec<PathBuf>,
    /// Whether the object is present in the store.
    pub present: bool,
}

impl Store {
    /// Compare tracked state against the live filesystem and the backup
    /// store.
    ///
    /// Store-integrity findings (orphaned or broken backup entries) are
    /// reported here rather than failing unrelated operations.
    ///
    /// # Errors
    ///
    /// Fails when not installed, or when the lock or backup directory
    /// cannot be read.
    pub fn status(&self) -> Result<StatusSnapshot, StoreError> {
        if !self.is_installed() {
            return Err(StoreError::NotInstalled);
        }

        let lck = self.load_lock()?;
        let (available, broken) = self.backups().scan()?;

        let mut tracked = Vec::with_capacity(lck.files.len());
        let mut ref_paths: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

        for entry in &lck.files {
            if entry.path.as_os_str().is_empty() {
                continue;
            }

            let mut item = TrackedStatus {
                path: entry.path.clone(),
                prev_digest: None,
                backup_present: false,
                drifted: false,
                missing: false,
            };

            match fs::symlink_metadata(&entry.path) {
                Ok(_) => {
                    if !entry.curr.digest.is_zero() {
                        let live = Digest::for_path(&entry.path)?;
                        item.drifted = live != entry.curr.digest;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    item.drifted = true;
                    item.missing = true;
                }
                Err(e) => {
                    return Err(StoreError::io(
                        format!("snapshot tracked path {}", entry.path.display()),
                        e,
                    ));
                }
            }

            if let Some(prev) = &entry.prev
                && !prev.digest.is_zero()
            {
                let key = prev.digest.to_string();
                item.backup_present = available.contains(&key);
                item.prev_digest = Some(key.clone());
                ref_paths.entry(key).or_default().push(entry.path.clone());
            }

            tracked.push(item);
        }

        tracked.sort_by(|a, b| a.path.cmp(&b.path));

        let backup_refs = ref_paths
            .iter()
            .map(|(digest, paths)| {
                let mut paths = paths.clone();
                paths.sort();
                BackupRefStatus {
                    digest: digest.clone(),
                    present: available.contains(digest),
                    paths,
                }
            })
            .collect();

        let orphaned = available
            .iter()
            .filter(|key| !ref_paths.contains_key(*key))
            .cloned()
            .collect();

        Ok(StatusSnapshot {
            source: lck.source,
            tracked,
            backup_refs,
            orphaned_backups: orphaned,
            broken_backups: broken,
        })
    }
}
