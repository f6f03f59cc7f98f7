//! Source validation: everything a load checks before mutating, without
//! the mutation.

use std::fs;
use std::path::PathBuf;

use anyhow::anyhow;

use crate::error::StoreError;
use crate::manifest::{self, ImportTree};
use crate::version;

use super::Store;
use super::lock::{LoadState, SOURCE_KIND_LOCAL};
use super::ops::{self, OpKind, source_display_name};

/// Outcome of validating a source.
#[derive(Debug, Clone)]
pub struct ValidateResult {
    /// Absolute directory of the validated source.
    pub source_dir: PathBuf,
    /// Display name of the source.
    pub source_name: String,
    /// Total operations the merged manifest produces.
    pub op_count: usize,
    /// Number of link entries.
    pub link_count: usize,
    /// Number of file entries.
    pub file_count: usize,
    /// Number of dir entries.
    pub dir_count: usize,
    /// Which manifests were included, post platform filtering.
    pub import_tree: ImportTree,
}

impl Store {
    /// Resolve, merge, and check a source without applying it.
    ///
    /// File sources must exist and be regular files; link targets may
    /// intentionally not exist yet; dirs have no source to check. With no
    /// argument, the currently loaded source is validated.
    ///
    /// # Errors
    ///
    /// Fails on any manifest, validation, or version error, or when a file
    /// source is missing or not a regular file.
    pub fn validate(&self, source: Option<&str>) -> Result<ValidateResult, StoreError> {
        let target = self.resolve_validate_source(source)?;

        let (m, source_dir, tree) = manifest::load_with_tree(&target)?;
        version::ensure_compatible(&m.tohru.version).map_err(|source| {
            StoreError::UnsupportedVersion {
                subject: "source",
                version: m.tohru.version.clone(),
                source,
            }
        })?;

        let operations = ops::build_operations(&m, &source_dir)?;

        for op in &operations {
            match op.kind {
                OpKind::Link => {
                    // Symlink targets may intentionally not exist yet.
                }
                OpKind::File => {
                    let Some(src) = op.source.as_deref() else {
                        continue;
                    };
                    let meta = fs::metadata(src).map_err(|e| {
                        StoreError::io(format!("validate file source {}", src.display()), e)
                    })?;
                    if !meta.is_file() {
                        return Err(StoreError::Other(anyhow!(
                            "validate file source {}: source is not a regular file",
                            src.display()
                        )));
                    }
                }
                OpKind::Dir => {
                    // No source path for dir operations.
                }
            }
        }

        Ok(ValidateResult {
            source_name: source_display_name(&m.source.name, &source_dir.to_string_lossy()),
            source_dir,
            op_count: operations.len(),
            link_count: m.links.len(),
            file_count: m.files.len(),
            dir_count: m.dirs.len(),
            import_tree: tree,
        })
    }

    fn resolve_validate_source(&self, source: Option<&str>) -> Result<String, StoreError> {
        if let Some(explicit) = source {
            let trimmed = explicit.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        if !self.is_installed() {
            return Err(StoreError::Other(anyhow!(
                "validate requires a source argument when tohru is not installed"
            )));
        }

        let lck = self.load_lock()?;
        if lck.source.state != LoadState::Loaded {
            return Err(StoreError::Other(anyhow!(
                "validate requires a source argument when no source is loaded"
            )));
        }
        if lck.source.kind != SOURCE_KIND_LOCAL {
            return Err(StoreError::UnsupportedSourceKind {
                kind: lck.source.kind,
            });
        }
        if lck.source.loc.trim().is_empty() {
            return Err(StoreError::EmptySourceLocation);
        }

        Ok(lck.source.loc)
    }
}
