//! Domain-specific error types for the tohru engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Internal modules return typed errors (e.g., [`ManifestError`],
//! [`ConflictError`]) while command handlers at the CLI boundary convert
//! them to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! StoreError
//! ├── Manifest(ManifestError)     — manifest decoding, import resolution
//! ├── Validation(ValidationError) — operation building (pre-mutation)
//! ├── Conflict(ConflictError)     — per-destination apply/unload refusals
//! ├── Digest(DigestError)         — content addressing failures
//! ├── RolledBack / RollbackFailed — load transaction outcomes
//! └── precondition variants       — not installed, version gate, ...
//! ```

use std::path::PathBuf;

use thiserror::Error;

use crate::version::SemVer;

/// Top-level error type for store operations.
///
/// Aggregates domain-specific sub-errors and is convertible to
/// [`anyhow::Error`] for use at CLI command boundaries.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store directory already holds config and lock files.
    #[error("tohru is already installed")]
    AlreadyInstalled,

    /// The store directory has not been initialized.
    #[error("tohru is not installed")]
    NotInstalled,

    /// Reload was requested while no source is loaded.
    #[error("no loaded source to reload")]
    NothingLoaded,

    /// The lock references a source kind this build cannot handle.
    #[error("unsupported source kind {kind:?}")]
    UnsupportedSourceKind {
        /// Source kind recorded in the lock file.
        kind: String,
    },

    /// The lock claims a loaded source but records no location.
    #[error("loaded source location is empty")]
    EmptySourceLocation,

    /// A config or manifest version failed the compatibility gate.
    #[error("unsupported {subject} version {version:?}: {source}")]
    UnsupportedVersion {
        /// What carried the version field (`"config"` or `"source"`).
        subject: &'static str,
        /// The offending version string.
        version: String,
        /// Underlying compatibility failure.
        source: VersionError,
    },

    /// Manifest loading or import resolution failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Operation building rejected the merged manifest.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A destination or managed path refused the requested change.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Content addressing failed for an object under inspection.
    #[error(transparent)]
    Digest(#[from] DigestError),

    /// Load failed mid-mutation and the filesystem was restored.
    #[error("load failed and all changes were rolled back: {cause}")]
    RolledBack {
        /// The failure that triggered the rollback.
        cause: Box<StoreError>,
    },

    /// Load failed mid-mutation and the rollback itself also failed.
    #[error("load failed ({cause}); rollback also failed, filesystem may be inconsistent: {rollback}")]
    RollbackFailed {
        /// The failure that triggered the rollback.
        cause: Box<StoreError>,
        /// The error the rollback ran into.
        rollback: Box<StoreError>,
    },

    /// An I/O operation on store files failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Catch-all for contextualized filesystem helper failures.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Wrap an I/O error with a human-readable context string.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors from manifest loading and import-graph resolution.
///
/// All of these are fatal before any filesystem mutation begins.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// No `tohru.toml` exists in the source directory.
    #[error("no manifest found in {dir} (expected {file})", dir = .dir.display(), file = crate::manifest::MANIFEST_FILE)]
    NotFound {
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// The manifest path resolves to a directory, not a file.
    #[error("manifest path is a directory: {path}", path = .path.display())]
    IsDirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// The manifest file exists but is not valid TOML for a manifest.
    #[error("decode manifest {path}: {source}", path = .path.display())]
    Decode {
        /// Path of the file that failed to decode.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// An import chain re-entered a manifest currently being resolved.
    #[error("manifest import cycle detected: {}", format_chain(.chain))]
    Cycle {
        /// The resolution stack at detection time, ending with the repeat.
        chain: Vec<PathBuf>,
    },

    /// An import canonicalizes to a path outside the source root.
    #[error("import path escapes source root {root}: {path}", root = .root.display(), path = .path.display())]
    EscapesRoot {
        /// Canonical source root.
        root: PathBuf,
        /// Canonical offending path.
        path: PathBuf,
    },

    /// An `import` declaration has an empty path.
    #[error("import path is empty")]
    EmptyImport,

    /// Reading or resolving a manifest path failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Path expansion/normalization failed.
    #[error("{0}")]
    Path(#[from] anyhow::Error),
}

impl ManifestError {
    /// Wrap an I/O error with a human-readable context string.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors from turning a merged manifest into an operation list.
///
/// All of these are fatal before any filesystem mutation begins.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Two manifest entries resolve to the same destination path.
    #[error("duplicate destination in manifest: {dest}", dest = .dest.display())]
    DuplicateDestination {
        /// The destination claimed twice.
        dest: PathBuf,
    },

    /// A source-relative path normalizes outside the source root.
    #[error("{field} escapes source root {root}: {path}", root = .root.display(), path = .path.display())]
    EscapesRoot {
        /// Manifest field the path came from (e.g. `"link.to"`).
        field: &'static str,
        /// The source root.
        root: PathBuf,
        /// The resolved offending path.
        path: PathBuf,
    },

    /// A manifest entry has an empty path field.
    #[error("{field} is empty")]
    EmptyPath {
        /// Manifest field that was empty.
        field: &'static str,
    },

    /// A path field could not be resolved to an absolute path.
    #[error("{field} {value:?}: {reason}")]
    InvalidPath {
        /// Manifest field the path came from.
        field: &'static str,
        /// Raw value as written in the manifest.
        value: String,
        /// Why resolution failed.
        reason: String,
    },
}

/// Per-destination refusals raised while applying or unloading.
///
/// Each variant is fatal by default but overridable by `--force` (and a
/// subset by `--discard-changes`).
#[derive(Error, Debug)]
pub enum ConflictError {
    /// The destination exists and applying would destroy it.
    #[error("destination exists (would clobber), use --force to overwrite: {dest}", dest = .dest.display())]
    WouldClobber {
        /// The occupied destination.
        dest: PathBuf,
    },

    /// The destination exists, backups are disabled, and no prior backup
    /// reference is carried for this path.
    #[error("destination exists and options.backup=false, refusing to clobber without --force: {dest}", dest = .dest.display())]
    BackupsDisabled {
        /// The occupied destination.
        dest: PathBuf,
    },

    /// A managed object's on-disk digest no longer matches the lock.
    #[error("managed path was modified: {path}", path = .path.display())]
    Modified {
        /// The drifted managed path.
        path: PathBuf,
    },

    /// A managed object recorded in the lock is gone from disk.
    #[error("managed path missing: {path}", path = .path.display())]
    Missing {
        /// The missing managed path.
        path: PathBuf,
    },

    /// A referenced backup object is absent from the store.
    #[error("missing backup object {backup} for {dest}", backup = .backup.display(), dest = .dest.display())]
    BackupMissing {
        /// Expected backup object path.
        backup: PathBuf,
        /// Destination the backup was meant to restore.
        dest: PathBuf,
    },

    /// A stored backup object no longer hashes to its key.
    #[error("backup digest mismatch for {path}", path = .path.display())]
    BackupDigestMismatch {
        /// Path of the corrupt backup object.
        path: PathBuf,
    },

    /// Two different objects hashed to the same backup key.
    #[error("backup collision for key {key} at {path}", path = .path.display())]
    BackupCollision {
        /// The contested digest key.
        key: String,
        /// Path of the existing backup object.
        path: PathBuf,
    },

    /// A backup restore found its destination already occupied.
    #[error("restore destination exists for {dest}", dest = .dest.display())]
    RestoreDestinationExists {
        /// The occupied restore destination.
        dest: PathBuf,
    },
}

/// Errors from digesting filesystem objects.
#[derive(Error, Debug)]
pub enum DigestError {
    /// A serialized digest did not have the `kind:algorithm:sum` shape.
    #[error("invalid digest {raw:?} (expected kind:algorithm:sum)")]
    Malformed {
        /// The raw string that failed to parse.
        raw: String,
    },

    /// The kind segment names no known object kind.
    #[error("unsupported digest kind {kind:?}")]
    UnsupportedKind {
        /// The unrecognized kind segment.
        kind: String,
    },

    /// A null digest carried an algorithm or sum.
    #[error("null digest must not include algorithm or sum")]
    NullWithFields,

    /// A non-null digest is missing its algorithm.
    #[error("digest algorithm is required")]
    MissingAlgorithm,

    /// A non-null digest is missing its sum.
    #[error("digest sum is required")]
    MissingSum,

    /// The object is neither a file, directory, nor symlink.
    #[error("unsupported file type at {path}", path = .path.display())]
    UnsupportedFileType {
        /// Path of the undigestible object.
        path: PathBuf,
    },

    /// Reading the object failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl DigestError {
    /// Wrap an I/O error with a human-readable context string.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors from semantic-version parsing and the compatibility gate.
#[derive(Error, Debug)]
pub enum VersionError {
    /// The version string is empty after trimming.
    #[error("version is empty")]
    Empty,

    /// The version string is not `MAJOR.MINOR.PATCH`.
    #[error("invalid semantic version {raw:?} (expected MAJOR.MINOR.PATCH)")]
    Invalid {
        /// The raw string that failed to parse.
        raw: String,
    },

    /// The required major version differs from the running binary's.
    #[error("unsupported major version {required} (current major is {current})")]
    MajorMismatch {
        /// Major version the source requires.
        required: u64,
        /// Major version of the running binary.
        current: u64,
    },

    /// The source requires a newer engine than this one.
    #[error("requires tohru >= {required} (current {current})")]
    TooNew {
        /// Version the source requires.
        required: SemVer,
        /// Version of the running binary.
        current: SemVer,
    },
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // -----------------------------------------------------------------------
    // Display formats
    // -----------------------------------------------------------------------

    #[test]
    fn conflict_modified_display() {
        let e = ConflictError::Modified {
            path: PathBuf::from("/home/u/.gitconfig"),
        };
        assert_eq!(e.to_string(), "managed path was modified: /home/u/.gitconfig");
    }

    #[test]
    fn conflict_backups_disabled_display_mentions_option() {
        let e = ConflictError::BackupsDisabled {
            dest: PathBuf::from("/home/u/.bashrc"),
        };
        assert!(e.to_string().contains("options.backup=false"));
        assert!(e.to_string().contains("--force"));
    }

    #[test]
    fn manifest_cycle_display_joins_chain() {
        let e = ManifestError::Cycle {
            chain: vec![PathBuf::from("/s/a.toml"), PathBuf::from("/s/b.toml")],
        };
        assert_eq!(
            e.to_string(),
            "manifest import cycle detected: /s/a.toml -> /s/b.toml"
        );
    }

    #[test]
    fn validation_duplicate_destination_display() {
        let e = ValidationError::DuplicateDestination {
            dest: PathBuf::from("/home/u/.vimrc"),
        };
        assert_eq!(
            e.to_string(),
            "duplicate destination in manifest: /home/u/.vimrc"
        );
    }

    #[test]
    fn rolled_back_wraps_cause() {
        let cause = StoreError::Conflict(ConflictError::Missing {
            path: PathBuf::from("/x"),
        });
        let e = StoreError::RolledBack {
            cause: Box::new(cause),
        };
        assert!(e.to_string().contains("rolled back"));
        assert!(e.to_string().contains("managed path missing"));
    }

    // -----------------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------------

    #[test]
    fn store_error_from_conflict() {
        let e: StoreError = ConflictError::Missing {
            path: PathBuf::from("/x"),
        }
        .into();
        assert!(matches!(e, StoreError::Conflict(_)));
    }

    #[test]
    fn store_error_converts_to_anyhow() {
        let e = StoreError::NotInstalled;
        let any: anyhow::Error = e.into();
        assert_eq!(any.to_string(), "tohru is not installed");
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<StoreError>();
        assert_send_sync::<ManifestError>();
        assert_send_sync::<ValidationError>();
        assert_send_sync::<ConflictError>();
        assert_send_sync::<DigestError>();
        assert_send_sync::<VersionError>();
    }
}
