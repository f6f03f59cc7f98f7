//! Filesystem helpers shared by the engine and the backup store.
//!
//! Copies preserve symlink targets and POSIX mode bits, never follow
//! symlinks, and stage through a sibling temp name so a crash cannot leave
//! a half-written object at the final path.

use anyhow::{Context as _, Result, bail};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` or `~/` to the user's home directory.
///
/// Returns the path unchanged when it has no home prefix or the home
/// directory cannot be determined.
#[must_use]
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Resolve `raw` to an absolute, lexically normalized path.
///
/// Expands a home prefix, joins relative paths onto the current directory,
/// and cleans `.`/`..` segments without touching the filesystem.
///
/// # Errors
///
/// Returns an error if the path is empty or the current directory cannot
/// be determined.
pub fn abs_path(raw: &str) -> Result<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("path is empty");
    }

    let expanded = expand_home(trimmed);
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .context("resolve current directory")?
            .join(expanded)
    };

    Ok(clean_path(&absolute))
}

/// Lexically normalize a path: drop `.` segments, resolve `..` against
/// preceding components, and collapse an empty result to `.`.
///
/// Purely textual; symlinks are not resolved.
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for comp in path.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => parts.push(comp),
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // ".." above the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                // leading ".."s in a relative path are kept
                _ => parts.push(comp),
            },
            Component::Normal(_) => parts.push(comp),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }

    let mut cleaned = PathBuf::new();
    for comp in parts {
        cleaned.push(comp.as_os_str());
    }
    cleaned
}

/// Whether `candidate` is `root` or a descendant of it, judged lexically
/// on the cleaned forms of both paths.
#[must_use]
pub fn path_within_root(root: &Path, candidate: &Path) -> bool {
    clean_path(candidate).starts_with(clean_path(root))
}

/// Number of normal components in the cleaned path.
#[must_use]
pub fn path_depth(path: &Path) -> usize {
    clean_path(path)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Ensure the parent directory of `path` exists, creating it (and any
/// ancestors) if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create parent: {}", parent.display()))?;
    }
    Ok(())
}

/// Copy a regular file, staging through a sibling temp name and renaming
/// into place. Permission bits are carried over by the copy.
///
/// # Errors
///
/// Returns an error if `src` is not a regular file or the copy/rename
/// fails.
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    let meta =
        fs::metadata(src).with_context(|| format!("stat source file {}", src.display()))?;
    if !meta.is_file() {
        bail!("source is not a regular file: {}", src.display());
    }

    ensure_parent_dir(dest)?;

    let tmp = sibling_tmp(dest);
    fs::copy(src, &tmp)
        .with_context(|| format!("copy {} to {}", src.display(), tmp.display()))?;

    if let Err(e) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("replace {}", dest.display()));
    }
    Ok(())
}

/// Copy any filesystem object to `dest`: symlinks keep their target string,
/// regular files keep their mode bits, directories are copied recursively.
///
/// # Errors
///
/// Returns an error for object types other than symlink/file/directory, or
/// on any underlying I/O failure.
pub fn copy_path(src: &Path, dest: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)
        .with_context(|| format!("stat source path {}", src.display()))?;
    let ftype = meta.file_type();

    if ftype.is_symlink() {
        let target = fs::read_link(src)
            .with_context(|| format!("read symlink {}", src.display()))?;
        ensure_parent_dir(dest)?;
        create_symlink(&target, dest)?;
        Ok(())
    } else if ftype.is_file() {
        copy_file(src, dest)
    } else if ftype.is_dir() {
        copy_dir_recursive(src, dest)
    } else {
        bail!("unsupported source type at {}", src.display());
    }
}

/// Recursively copy a directory tree, preserving symlinks as symlinks.
///
/// # Errors
///
/// Returns an error if the destination cannot be created, an entry cannot
/// be read, or an object of unsupported type is encountered.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    let meta = fs::metadata(src)
        .with_context(|| format!("stat source directory {}", src.display()))?;
    fs::create_dir_all(dest)
        .with_context(|| format!("create directory {}", dest.display()))?;
    let _ = fs::set_permissions(dest, meta.permissions());

    for entry in
        fs::read_dir(src).with_context(|| format!("read directory {}", src.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", src.display()))?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let ftype = entry
            .file_type()
            .with_context(|| format!("stat {}", src_path.display()))?;

        if ftype.is_symlink() {
            let target = fs::read_link(&src_path)
                .with_context(|| format!("read symlink {}", src_path.display()))?;
            create_symlink(&target, &dest_path)?;
        } else if ftype.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else if ftype.is_file() {
            copy_file(&src_path, &dest_path)?;
        } else {
            bail!("unsupported source type at {}", src_path.display());
        }
    }
    Ok(())
}

/// Create a symlink at `link` pointing to `target`.
///
/// # Errors
///
/// Returns an error if the link cannot be created.
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!("create symlink {} -> {}", link.display(), target.display())
        })?;
    }

    #[cfg(windows)]
    {
        let result = if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        };
        result.with_context(|| {
            format!("create symlink {} -> {}", link.display(), target.display())
        })?;
    }

    Ok(())
}

/// Remove a filesystem object of any kind. Directories are removed
/// recursively; symlinks are removed without following. Does nothing when
/// the path does not exist.
///
/// # Errors
///
/// Returns an error when asked to remove `.` or a filesystem root, or when
/// removal fails for an existing object.
pub fn remove_path(path: &Path) -> Result<()> {
    let clean = clean_path(path);
    if clean == Path::new(".") || clean.parent().is_none() {
        bail!("refusing to remove unsafe path: {}", path.display());
    }

    let meta = match fs::symlink_metadata(&clean) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("stat {}", clean.display()));
        }
    };

    if meta.is_dir() && !meta.file_type().is_symlink() {
        fs::remove_dir_all(&clean)
            .with_context(|| format!("remove directory {}", clean.display()))
    } else {
        fs::remove_file(&clean).with_context(|| format!("remove {}", clean.display()))
    }
}

/// Move an object to a new path, falling back to copy-then-remove when the
/// rename crosses a filesystem boundary.
///
/// # Errors
///
/// Returns an error if both the rename and the copy fall through.
pub fn rename_or_copy(src: &Path, dest: &Path) -> Result<()> {
    if fs::rename(src, dest).is_ok() {
        return Ok(());
    }
    copy_path(src, dest)?;
    remove_path(src)
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tohru_tmp");
    PathBuf::from(name)
}
