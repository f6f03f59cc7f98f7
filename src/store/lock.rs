//! Durable lock state (`lock.json`): what tohru currently owns.
//!
//! The lock is the single source of truth for the engine. It is created
//! once at install (unloaded, empty) and mutated only by load, switch, and
//! unload, each of which rewrites it atomically after its state transition
//! completes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// Source kind for manifests on the local filesystem, the only kind this
/// build supports.
pub const SOURCE_KIND_LOCAL: &str = "local";

/// Whether a source is currently applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// A source's objects are materialized and tracked.
    Loaded,
    /// Nothing is owned; `files` and `dirs` are empty.
    #[default]
    Unloaded,
}

/// The persisted engine state.
///
/// Invariants: `state = unloaded` implies empty `files` and `dirs`;
/// `state = loaded` implies a non-empty `loc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    /// Identity of the active source, if any.
    #[serde(rename = "manifest")]
    pub source: SourceRef,
    /// Objects the engine created and tracks, in apply order.
    #[serde(rename = "file", default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ManagedFile>,
    /// Parent directories created solely to host managed objects.
    #[serde(rename = "dir", default, skip_serializing_if = "Vec::is_empty")]
    pub dirs: Vec<AutoDir>,
}

/// Identity of the currently loaded source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRef {
    /// Whether the source is applied.
    pub state: LoadState,
    /// Source kind; always [`SOURCE_KIND_LOCAL`] in this build.
    pub kind: String,
    /// Absolute path of the source directory; empty when unloaded.
    pub loc: String,
    /// Display name from the manifest, if it supplied one.
    pub name: String,
}

impl Default for SourceRef {
    fn default() -> Self {
        Self {
            state: LoadState::Unloaded,
            kind: SOURCE_KIND_LOCAL.to_string(),
            loc: String::new(),
            name: String::new(),
        }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self {
            source: SourceRef::default(),
            files: Vec::new(),
            dirs: Vec::new(),
        }
    }
}

impl Lock {
    /// Whether the lock records an applied source.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.source.state == LoadState::Loaded
    }
}

/// Snapshot of one filesystem object at a point in time.
///
/// Used both for `curr` snapshots (drift detection) and backup references,
/// where the digest doubles as the backup object's storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedObject {
    /// Where the object was observed (or stored, for backups).
    pub path: PathBuf,
    /// Typed content digest at observation time.
    #[serde(rename = "hash")]
    pub digest: Digest,
}

/// One object the engine created and tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedFile {
    /// Destination path the engine owns.
    pub path: PathBuf,
    /// State observed immediately after creation; later divergence means
    /// the object was modified externally.
    pub curr: TrackedObject,
    /// Backup of whatever occupied `path` before this entry claimed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<TrackedObject>,
}

/// A parent directory created only to host managed objects; removed again
/// when empty and no longer needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoDir {
    /// Absolute path of the directory.
    pub path: PathBuf,
}
