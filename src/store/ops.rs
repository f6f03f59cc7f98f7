//! Operation building and the transactional apply/unload engine.
//!
//! A merged manifest becomes an ordered list of [`Operation`]s with fully
//! resolved absolute paths. Load executes them under a staging journal:
//! the old source is unloaded (skipping restores for destinations the new
//! source is about to reoccupy), a transitional unloaded lock is persisted
//! as a durability checkpoint, the new operations are applied, and the new
//! lock is saved. Any mutation failure rolls the filesystem and lock back
//! to their pre-load state.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::digest::Digest;
use crate::error::{ConflictError, StoreError, ValidationError};
use crate::fsutil;
use crate::manifest::{self, Manifest};
use crate::version;

use super::config::Config;
use super::lock::{AutoDir, LoadState, Lock, ManagedFile, SOURCE_KIND_LOCAL, TrackedObject};
use super::txn::TxnJournal;
use super::Store;

/// Per-invocation permissions for destructive steps.
///
/// `force` licenses clobbering and removal broadly: modified or missing
/// managed objects, missing backups, digest mismatches, and occupied
/// destinations. `discard_changes` only licenses replacing or removing a
/// *modified* managed object.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Broad license to clobber and to tolerate missing state.
    pub force: bool,
    /// Narrow license to discard external edits to managed objects.
    pub discard_changes: bool,
}

/// What kind of object an operation materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Symlink from the destination into the source tree.
    Link,
    /// File copied out of the source tree.
    File,
    /// Bare directory.
    Dir,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Link => "link",
            Self::File => "file",
            Self::Dir => "dir",
        })
    }
}

/// One fully resolved filesystem operation.
#[derive(Debug, Clone)]
pub struct Operation {
    /// What to materialize.
    pub kind: OpKind,
    /// Absolute source path inside the source tree; `None` for dirs.
    pub source: Option<PathBuf>,
    /// Absolute destination path.
    pub dest: PathBuf,
    /// Whether the result is recorded in the lock and reversed on unload.
    pub track: bool,
}

/// Outcome of a load or switch.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    /// Absolute directory of the loaded source.
    pub source_dir: PathBuf,
    /// Display name of the loaded source.
    pub source_name: String,
    /// Number of tracked objects the new source materialized.
    pub tracked_count: usize,
    /// Display name of the source that was unloaded first, if any.
    pub unloaded_source_name: String,
    /// Number of managed objects the previous source had.
    pub unloaded_tracked_count: usize,
    /// Backup objects removed by the post-load sweep.
    pub removed_backup_count: usize,
    /// Every path touched, deduplicated, in first-touch order.
    pub changed_paths: Vec<PathBuf>,
}

/// Outcome of an unload.
#[derive(Debug, Clone, Default)]
pub struct UnloadResult {
    /// Display name of the unloaded source.
    pub source_name: String,
    /// Number of managed objects removed.
    pub removed_count: usize,
    /// Backup objects removed by the post-unload sweep.
    pub removed_backup_count: usize,
    /// Every path touched, deduplicated, in first-touch order.
    pub changed_paths: Vec<PathBuf>,
}

/// Outcome of an explicit backup sweep.
#[derive(Debug, Clone, Default)]
pub struct TidyResult {
    /// Backup objects removed.
    pub removed_count: usize,
    /// Every path touched, deduplicated, in first-touch order.
    pub changed_paths: Vec<PathBuf>,
}

/// Collects touched paths, deduplicated, in first-touch order.
#[derive(Debug, Default)]
pub(crate) struct PathRecorder {
    seen: HashSet<PathBuf>,
    paths: Vec<PathBuf>,
}

impl PathRecorder {
    fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, path: &Path) {
        if path.as_os_str().is_empty() || self.seen.contains(path) {
            return;
        }
        self.seen.insert(path.to_path_buf());
        self.paths.push(path.to_path_buf());
    }

    fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

/// Per-attempt outcome of removing one auto-created directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoDirOutcome {
    Removed,
    NotEmpty,
    Missing,
    NotADir,
    Denied,
}

impl Store {
    /// Load a source: unload whatever is active, apply the new manifest,
    /// and persist the new lock. See the module docs for the transaction
    /// shape.
    ///
    /// # Errors
    ///
    /// Structural errors (manifest, validation, version) fail before any
    /// mutation. Mutation failures roll back and surface as
    /// [`StoreError::RolledBack`].
    pub fn load(&self, source: &str, opts: Options) -> Result<LoadResult, StoreError> {
        self.ensure_installed()?;
        let cfg = self.load_config()?;
        self.switch_with_config(&cfg, source, opts)
    }

    /// Alias for [`load`](Self::load): switching is loading a different
    /// source.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn switch(&self, source: &str, opts: Options) -> Result<LoadResult, StoreError> {
        self.load(source, opts)
    }

    /// Re-load the currently loaded source.
    ///
    /// # Errors
    ///
    /// Fails when nothing is loaded, the source kind is unsupported, or the
    /// recorded location is empty; otherwise same as [`load`](Self::load).
    pub fn reload(&self, opts: Options) -> Result<LoadResult, StoreError> {
        if !self.is_installed() {
            return Err(StoreError::NotInstalled);
        }

        let cfg = self.load_config()?;
        let lck = self.load_lock()?;

        if lck.source.state != LoadState::Loaded {
            return Err(StoreError::NothingLoaded);
        }
        if lck.source.kind != SOURCE_KIND_LOCAL {
            return Err(StoreError::UnsupportedSourceKind {
                kind: lck.source.kind,
            });
        }
        if lck.source.loc.trim().is_empty() {
            return Err(StoreError::EmptySourceLocation);
        }

        let loc = lck.source.loc.clone();
        self.switch_with_config(&cfg, &loc, opts)
    }

    /// Remove every managed object, restore backups, and reset the lock.
    ///
    /// Unload is a best-effort teardown: a mid-way failure leaves already
    /// processed entries removed and is reported so the caller can retry
    /// with `force` or `discard_changes`.
    ///
    /// # Errors
    ///
    /// Fails when not installed, or on the first conflict the options do
    /// not override.
    pub fn unload(&self, opts: Options) -> Result<UnloadResult, StoreError> {
        if !self.is_installed() {
            return Err(StoreError::NotInstalled);
        }

        let cfg = self.load_config()?;
        let lck = self.load_lock()?;
        let mut changes = PathRecorder::new();

        unload_managed_paths(self, &lck.files, None, opts, &mut changes, None)?;
        cleanup_auto_dirs(&lck.dirs, &mut changes, None)?;

        let new_lock = Lock::default();
        self.save_lock(&new_lock)?;
        changes.add(&self.lock_path());

        let removed_backups = if cfg.options.clean {
            clean_backup_store(self, &new_lock.files, &mut changes)?
        } else {
            0
        };

        tracing::info!(
            source = %source_display_name(&lck.source.name, &lck.source.loc),
            removed = lck.files.len(),
            "unloaded source"
        );

        Ok(UnloadResult {
            source_name: source_display_name(&lck.source.name, &lck.source.loc),
            removed_count: lck.files.len(),
            removed_backup_count: removed_backups,
            changed_paths: changes.into_paths(),
        })
    }

    /// Unload (when anything is loaded) and remove the store root.
    ///
    /// # Errors
    ///
    /// Same as [`unload`](Self::unload), plus failures removing the store
    /// directory itself.
    pub fn uninstall(&self, opts: Options) -> Result<UnloadResult, StoreError> {
        if !self.is_installed() {
            return Err(StoreError::NotInstalled);
        }

        let result = self.unload(opts)?;
        fsutil::remove_path(self.root())?;
        Ok(result)
    }

    /// Sweep backup objects not referenced by the current lock, without
    /// touching tracked files.
    ///
    /// # Errors
    ///
    /// Fails when not installed or when the sweep hits an I/O error.
    pub fn tidy(&self) -> Result<TidyResult, StoreError> {
        if !self.is_installed() {
            return Err(StoreError::NotInstalled);
        }

        let lck = self.load_lock()?;
        let mut changes = PathRecorder::new();
        let removed = clean_backup_store(self, &lck.files, &mut changes)?;

        Ok(TidyResult {
            removed_count: removed,
            changed_paths: changes.into_paths(),
        })
    }

    fn switch_with_config(
        &self,
        cfg: &Config,
        source: &str,
        opts: Options,
    ) -> Result<LoadResult, StoreError> {
        let (m, source_dir) = manifest::load(source)?;
        version::ensure_compatible(&m.tohru.version).map_err(|source| {
            StoreError::UnsupportedVersion {
                subject: "source",
                version: m.tohru.version.clone(),
                source,
            }
        })?;

        let ops = build_operations(&m, &source_dir)?;
        let old_lock = self.load_lock()?;

        let old_by_path: HashMap<PathBuf, Option<TrackedObject>> = old_lock
            .files
            .iter()
            .map(|f| (f.path.clone(), f.prev.clone()))
            .collect();
        let occupied_by_new: HashSet<PathBuf> = ops.iter().map(|op| op.dest.clone()).collect();

        let mut changes = PathRecorder::new();
        let mut journal = TxnJournal::begin(self.root())?;

        let mutation = self.run_load_mutation(
            cfg,
            &m,
            &source_dir,
            &ops,
            &old_lock,
            &old_by_path,
            &occupied_by_new,
            opts,
            &mut changes,
            &mut journal,
        );

        let new_lock = match mutation {
            Ok(new_lock) => new_lock,
            Err(cause) => {
                return match journal.rollback(self, &old_lock) {
                    Ok(()) => Err(StoreError::RolledBack {
                        cause: Box::new(cause),
                    }),
                    Err(rollback) => Err(StoreError::RollbackFailed {
                        cause: Box::new(cause),
                        rollback: Box::new(rollback),
                    }),
                };
            }
        };

        journal.commit()?;

        let removed_backups = if cfg.options.clean {
            clean_backup_store(self, &new_lock.files, &mut changes)?
        } else {
            0
        };

        tracing::info!(
            source = %source_display_name(&m.source.name, &source_dir.to_string_lossy()),
            tracked = new_lock.files.len(),
            "loaded source"
        );

        Ok(LoadResult {
            source_dir: source_dir.clone(),
            source_name: source_display_name(&m.source.name, &source_dir.to_string_lossy()),
            tracked_count: new_lock.files.len(),
            unloaded_source_name: source_display_name(
                &old_lock.source.name,
                &old_lock.source.loc,
            ),
            unloaded_tracked_count: old_lock.files.len(),
            removed_backup_count: removed_backups,
            changed_paths: changes.into_paths(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_load_mutation(
        &self,
        cfg: &Config,
        m: &Manifest,
        source_dir: &Path,
        ops: &[Operation],
        old_lock: &Lock,
        old_by_path: &HashMap<PathBuf, Option<TrackedObject>>,
        occupied_by_new: &HashSet<PathBuf>,
        opts: Options,
        changes: &mut PathRecorder,
        journal: &mut TxnJournal,
    ) -> Result<Lock, StoreError> {
        unload_managed_paths(
            self,
            &old_lock.files,
            Some(occupied_by_new),
            opts,
            changes,
            Some(journal),
        )?;
        cleanup_auto_dirs(&old_lock.dirs, changes, Some(journal))?;

        // Durability checkpoint: persist the unloaded state before applying
        // the new source, so a crash from here on leaves "nothing loaded"
        // rather than a lock claiming objects that are gone.
        self.save_lock(&Lock::default())?;
        changes.add(&self.lock_path());

        let (tracked, auto_dirs) =
            apply_operations(self, cfg, ops, old_by_path, opts, changes, journal)?;

        let mut new_lock = Lock::default();
        new_lock.source.state = LoadState::Loaded;
        new_lock.source.kind = SOURCE_KIND_LOCAL.to_string();
        new_lock.source.loc = source_dir.to_string_lossy().into_owned();
        new_lock.source.name = m.source.name.trim().to_string();
        new_lock.files = tracked;
        new_lock.dirs = auto_dirs;

        self.save_lock(&new_lock)?;
        changes.add(&self.lock_path());

        Ok(new_lock)
    }
}

/// Turn a merged manifest into an ordered operation list with resolved,
/// validated absolute paths.
///
/// # Errors
///
/// Fails on empty paths, source paths escaping the source root, and
/// duplicate destinations across the combined set.
pub fn build_operations(
    m: &Manifest,
    source_dir: &Path,
) -> Result<Vec<Operation>, ValidationError> {
    let total = m.links.len() + m.files.len() + m.dirs.len();
    let mut ops: Vec<Operation> = Vec::with_capacity(total);
    let mut seen_dest: HashSet<PathBuf> = HashSet::with_capacity(total);

    fn add(
        ops: &mut Vec<Operation>,
        seen_dest: &mut HashSet<PathBuf>,
        op: Operation,
    ) -> Result<(), ValidationError> {
        if !seen_dest.insert(op.dest.clone()) {
            return Err(ValidationError::DuplicateDestination { dest: op.dest });
        }
        ops.push(op);
        Ok(())
    }

    for link in &m.links {
        let source = resolve_source_path(source_dir, &link.to, "link.to")?;
        let dest = resolve_dest_path(&link.from, "link.from")?;
        add(
            &mut ops,
            &mut seen_dest,
            Operation {
                kind: OpKind::Link,
                source: Some(source),
                dest,
                track: true,
            },
        )?;
    }

    for file in &m.files {
        let source = resolve_source_path(source_dir, &file.source, "file.source")?;
        let dest = resolve_dest_path(&file.dest, "file.dest")?;
        add(
            &mut ops,
            &mut seen_dest,
            Operation {
                kind: OpKind::File,
                source: Some(source),
                dest,
                track: file.is_tracked(),
            },
        )?;
    }

    for dir in &m.dirs {
        let dest = resolve_dest_path(&dir.path, "dir.path")?;
        add(
            &mut ops,
            &mut seen_dest,
            Operation {
                kind: OpKind::Dir,
                source: None,
                dest,
                track: dir.is_tracked(),
            },
        )?;
    }

    Ok(ops)
}

fn resolve_source_path(
    source_dir: &Path,
    raw: &str,
    field: &'static str,
) -> Result<PathBuf, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyPath { field });
    }

    let expanded = fsutil::expand_home(trimmed);
    let root = fsutil::clean_path(source_dir);
    let resolved = if expanded.is_absolute() {
        fsutil::clean_path(&expanded)
    } else {
        fsutil::clean_path(&root.join(expanded))
    };

    if !fsutil::path_within_root(&root, &resolved) {
        return Err(ValidationError::EscapesRoot {
            field,
            root,
            path: resolved,
        });
    }

    Ok(resolved)
}

fn resolve_dest_path(raw: &str, field: &'static str) -> Result<PathBuf, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyPath { field });
    }
    fsutil::abs_path(raw).map_err(|e| ValidationError::InvalidPath {
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn apply_operations(
    store: &Store,
    cfg: &Config,
    ops: &[Operation],
    old_by_path: &HashMap<PathBuf, Option<TrackedObject>>,
    opts: Options,
    changes: &mut PathRecorder,
    journal: &mut TxnJournal,
) -> Result<(Vec<ManagedFile>, Vec<AutoDir>), StoreError> {
    let mut tracked = Vec::with_capacity(ops.len());
    let mut auto_dir_set: BTreeSet<PathBuf> = BTreeSet::new();

    for op in ops {
        let prev = old_by_path.get(&op.dest).cloned().flatten();
        let prev = prepare_destination(store, cfg, op, prev, opts, changes, journal)?;

        for dir in ensure_parent_dirs(&op.dest)? {
            journal.record_created_dir(&dir);
            auto_dir_set.insert(dir);
        }

        match op.kind {
            OpKind::Link => {
                let target = op
                    .source
                    .as_deref()
                    .ok_or_else(|| anyhow!("link operation without a source path"))?;
                fsutil::create_symlink(target, &op.dest)?;
            }
            OpKind::File => {
                let source = op
                    .source
                    .as_deref()
                    .ok_or_else(|| anyhow!("file operation without a source path"))?;
                fsutil::copy_file(source, &op.dest)?;
            }
            OpKind::Dir => {
                fs::create_dir_all(&op.dest).map_err(|e| {
                    StoreError::io(format!("create directory {}", op.dest.display()), e)
                })?;
            }
        }
        journal.record_created(&op.dest);
        changes.add(&op.dest);
        tracing::debug!(kind = %op.kind, dest = %op.dest.display(), "materialized");

        if !op.track {
            continue;
        }

        let curr = snapshot(&op.dest)?;
        tracked.push(ManagedFile {
            path: op.dest.clone(),
            curr,
            prev,
        });
    }

    let auto_dirs = auto_dir_set
        .into_iter()
        .map(|path| AutoDir { path })
        .collect();
    Ok((tracked, auto_dirs))
}

// Decide what happens to whatever occupies `op.dest` before materializing:
// keep carrying the previous backup reference, create a fresh backup, or
// refuse without `force`.
fn prepare_destination(
    store: &Store,
    cfg: &Config,
    op: &Operation,
    prev: Option<TrackedObject>,
    opts: Options,
    changes: &mut PathRecorder,
    journal: &mut TxnJournal,
) -> Result<Option<TrackedObject>, StoreError> {
    let Some(current) = snapshot_if_exists(&op.dest)? else {
        return Ok(prev);
    };

    if !op.track {
        if !opts.force {
            return Err(ConflictError::WouldClobber {
                dest: op.dest.clone(),
            }
            .into());
        }
        journal.stage_removal(&op.dest)?;
        changes.add(&op.dest);
        return Ok(prev);
    }

    if prev.is_none() && cfg.options.backup {
        let stored = store.backups().persist(&op.dest, &current.digest)?;
        changes.add(&stored.path);
        journal.stage_removal(&op.dest)?;
        changes.add(&op.dest);
        return Ok(Some(stored));
    }

    if !opts.force {
        if prev.is_none() && !cfg.options.backup {
            return Err(ConflictError::BackupsDisabled {
                dest: op.dest.clone(),
            }
            .into());
        }
        return Err(ConflictError::WouldClobber {
            dest: op.dest.clone(),
        }
        .into());
    }

    journal.stage_removal(&op.dest)?;
    changes.add(&op.dest);
    Ok(prev)
}

// Remove managed objects deepest-first, restoring each entry's backup
// unless the path is about to be reoccupied by an incoming source.
fn unload_managed_paths(
    store: &Store,
    files: &[ManagedFile],
    occupied_by_new: Option<&HashSet<PathBuf>>,
    opts: Options,
    changes: &mut PathRecorder,
    mut journal: Option<&mut TxnJournal>,
) -> Result<(), StoreError> {
    for managed in sorted_for_removal(files, |f: &ManagedFile| f.path.as_path()) {
        remove_managed_object(managed, opts, changes, journal.as_deref_mut())?;

        let Some(prev) = &managed.prev else {
            continue;
        };
        if prev.digest.is_zero() && prev.path.as_os_str().is_empty() {
            continue;
        }
        if occupied_by_new.is_some_and(|set| set.contains(&managed.path)) {
            continue;
        }

        if store.backups().restore(prev, &managed.path, opts.force)? {
            changes.add(&managed.path);
            if let Some(j) = journal.as_deref_mut() {
                j.record_restored(&managed.path);
            }
        }
    }

    Ok(())
}

fn remove_managed_object(
    managed: &ManagedFile,
    opts: Options,
    changes: &mut PathRecorder,
    journal: Option<&mut TxnJournal>,
) -> Result<(), StoreError> {
    let path = &managed.path;
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    let Some(current) = snapshot_if_exists(path)? else {
        if opts.force {
            return Ok(());
        }
        return Err(ConflictError::Missing { path: path.clone() }.into());
    };

    if !opts.force
        && !opts.discard_changes
        && !managed.curr.digest.is_zero()
        && managed.curr.digest != current.digest
    {
        return Err(ConflictError::Modified { path: path.clone() }.into());
    }

    match journal {
        Some(j) => j.stage_removal(path)?,
        None => fsutil::remove_path(path)?,
    }
    changes.add(path);
    tracing::debug!(path = %path.display(), "removed managed object");
    Ok(())
}

// Best-effort removal of auto-created parent directories, deepest first.
// Every attempt gets an explicit outcome; only unexpected errors propagate.
fn cleanup_auto_dirs(
    dirs: &[AutoDir],
    changes: &mut PathRecorder,
    mut journal: Option<&mut TxnJournal>,
) -> Result<(), StoreError> {
    for dir in sorted_for_removal(dirs, |d: &AutoDir| d.path.as_path()) {
        let path = fsutil::clean_path(&dir.path);
        if path == Path::new(".") || path.parent().is_none() {
            continue;
        }

        match remove_auto_dir(&path)? {
            AutoDirOutcome::Removed => {
                changes.add(&path);
                if let Some(j) = journal.as_deref_mut() {
                    j.record_removed_dir(&path);
                }
            }
            outcome => {
                tracing::debug!(path = %path.display(), ?outcome, "left auto dir in place");
            }
        }
    }
    Ok(())
}

fn remove_auto_dir(path: &Path) -> Result<AutoDirOutcome, StoreError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AutoDirOutcome::Missing);
        }
        Err(e) => {
            return Err(StoreError::io(format!("stat auto dir {}", path.display()), e));
        }
    };

    if !meta.is_dir() || meta.file_type().is_symlink() {
        return Ok(AutoDirOutcome::NotADir);
    }

    match fs::remove_dir(path) {
        Ok(()) => Ok(AutoDirOutcome::Removed),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AutoDirOutcome::Missing),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Ok(AutoDirOutcome::Denied),
        Err(e)
            if matches!(
                e.kind(),
                std::io::ErrorKind::DirectoryNotEmpty | std::io::ErrorKind::AlreadyExists
            ) =>
        {
            Ok(AutoDirOutcome::NotEmpty)
        }
        Err(e) => Err(StoreError::io(
            format!("remove auto dir {}", path.display()),
            e,
        )),
    }
}

// Walk up from the destination collecting missing ancestors, then create
// them top-down, reporting only the ones this call actually created.
fn ensure_parent_dirs(dest: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let Some(parent) = dest.parent() else {
        return Ok(Vec::new());
    };
    if parent.as_os_str().is_empty() {
        return Ok(Vec::new());
    }

    let mut missing: Vec<PathBuf> = Vec::new();
    let mut cur = parent.to_path_buf();
    loop {
        match fs::metadata(&cur) {
            Ok(meta) => {
                if !meta.is_dir() {
                    return Err(StoreError::Other(anyhow!(
                        "path exists and is not a directory: {}",
                        cur.display()
                    )));
                }
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                missing.push(cur.clone());
                let Some(next) = cur.parent() else {
                    break;
                };
                if next.as_os_str().is_empty() {
                    break;
                }
                cur = next.to_path_buf();
            }
            Err(e) => {
                return Err(StoreError::io(
                    format!("stat parent directory {}", cur.display()),
                    e,
                ));
            }
        }
    }

    let mut created = Vec::with_capacity(missing.len());
    for dir in missing.iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => created.push(dir.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if !dir.is_dir() {
                    return Err(StoreError::io(
                        format!("create parent directory {}", dir.display()),
                        e,
                    ));
                }
            }
            Err(e) => {
                return Err(StoreError::io(
                    format!("create parent directory {}", dir.display()),
                    e,
                ));
            }
        }
    }

    Ok(created)
}

// Descending path depth, tie-broken by reverse lexicographic path, so
// nested paths are always processed before their parents.
fn sorted_for_removal<'a, T>(
    items: &'a [T],
    path_of: impl Fn(&T) -> &Path,
) -> Vec<&'a T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| {
        let (pa, pb) = (path_of(*a), path_of(*b));
        fsutil::path_depth(pb)
            .cmp(&fsutil::path_depth(pa))
            .then_with(|| pb.cmp(pa))
    });
    sorted
}

pub(crate) fn referenced_backup_keys(files: &[ManagedFile]) -> BTreeSet<String> {
    files
        .iter()
        .filter_map(|f| f.prev.as_ref())
        .filter(|prev| !prev.digest.is_zero())
        .map(|prev| prev.digest.to_string())
        .collect()
}

fn clean_backup_store(
    store: &Store,
    files: &[ManagedFile],
    changes: &mut PathRecorder,
) -> Result<usize, StoreError> {
    let removed = store.backups().sweep(&referenced_backup_keys(files))?;
    for path in &removed {
        changes.add(path);
    }
    Ok(removed.len())
}

fn snapshot(path: &Path) -> Result<TrackedObject, StoreError> {
    Ok(TrackedObject {
        path: path.to_path_buf(),
        digest: Digest::for_path(path)?,
    })
}

fn snapshot_if_exists(path: &Path) -> Result<Option<TrackedObject>, StoreError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(Some(snapshot(path)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(format!("stat {}", path.display()), e)),
    }
}

/// Display name for a source: the manifest name when set, otherwise the
/// base name of its directory.
#[must_use]
pub fn source_display_name(name: &str, loc: &str) -> String {
    let trimmed = name.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    let loc = loc.trim();
    if loc.is_empty() {
        return String::new();
    }
    fsutil::clean_path(Path::new(loc))
        .file_name()
        .map_or_else(|| loc.to_string(), |n| n.to_string_lossy().into_owned())
}
