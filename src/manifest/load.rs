//! Manifest location, decoding, and import-graph resolution.
//!
//! A source is either a manifest file or a directory containing one.
//! Imports are resolved depth-first relative to the importing manifest,
//! filtered by platform constraints, canonicalized, and checked against the
//! source root: nothing outside the root is ever read. An explicit stack of
//! canonical paths catches import cycles and reports the full chain.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ManifestError;
use crate::fsutil;
use crate::platform::Platform;

use super::Manifest;

/// File name every manifest lives under.
pub const MANIFEST_FILE: &str = "tohru.toml";

/// Which manifests were actually included after platform filtering.
///
/// Mirrors the import graph for diagnostic display; carries no apply
/// semantics.
#[derive(Debug, Clone, Default)]
pub struct ImportTree {
    /// Canonical path of this manifest file.
    pub path: PathBuf,
    /// Sub-trees for the imports that applied, in declaration order.
    pub imports: Vec<ImportTree>,
}

/// Resolve a source path and decode its fully merged manifest.
///
/// Returns the manifest and the absolute source directory.
///
/// # Errors
///
/// Fails on a missing or undecodable manifest, an import cycle, an import
/// escaping the source root, or any unreadable import target. There is no
/// partial result.
pub fn load(source: &str) -> Result<(Manifest, PathBuf), ManifestError> {
    let (manifest, source_dir, _) = load_with_tree(source)?;
    Ok((manifest, source_dir))
}

/// Like [`load`], but also returns the resolved import tree.
///
/// # Errors
///
/// Same failure modes as [`load`].
pub fn load_with_tree(source: &str) -> Result<(Manifest, PathBuf, ImportTree), ManifestError> {
    let abs_source = fsutil::abs_path(source)?;

    let info = fs::metadata(&abs_source)
        .map_err(|e| ManifestError::io(format!("stat source {source:?}"), e))?;

    if info.is_dir() {
        let manifest_path = find_manifest_file(&abs_source)?;
        let (manifest, tree) = load_with_imports(&manifest_path, &abs_source)?;
        return Ok((manifest, abs_source, tree));
    }

    let source_dir = abs_source
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let (manifest, tree) = load_with_imports(&abs_source, &source_dir)?;
    Ok((manifest, source_dir, tree))
}

fn load_with_imports(
    path: &Path,
    root_dir: &Path,
) -> Result<(Manifest, ImportTree), ManifestError> {
    let canonical_root = dunce::canonicalize(fsutil::clean_path(root_dir))
        .map_err(|e| ManifestError::io(format!("resolve source root {}", root_dir.display()), e))?;

    let mut ctx = LoadContext {
        root: fsutil::clean_path(&canonical_root),
        platform: Platform::current(),
        stack: Vec::with_capacity(8),
        in_stack: HashSet::with_capacity(8),
    };

    ctx.load(path)
}

struct LoadContext {
    root: PathBuf,
    platform: Platform,
    stack: Vec<PathBuf>,
    in_stack: HashSet<PathBuf>,
}

impl LoadContext {
    fn load(&mut self, path: &Path) -> Result<(Manifest, ImportTree), ManifestError> {
        let manifest_path = canonical_path(path)?;

        if !fsutil::path_within_root(&self.root, &manifest_path) {
            return Err(ManifestError::EscapesRoot {
                root: self.root.clone(),
                path: manifest_path,
            });
        }

        if self.in_stack.contains(&manifest_path) {
            let mut chain = self.stack.clone();
            chain.push(manifest_path);
            return Err(ManifestError::Cycle { chain });
        }

        self.in_stack.insert(manifest_path.clone());
        self.stack.push(manifest_path.clone());
        let result = self.load_inner(&manifest_path);
        self.stack.pop();
        self.in_stack.remove(&manifest_path);
        result
    }

    fn load_inner(
        &mut self,
        manifest_path: &Path,
    ) -> Result<(Manifest, ImportTree), ManifestError> {
        let mut current = decode_manifest(manifest_path)?;

        let mut merged = Manifest::default();
        let mut tree = ImportTree {
            path: manifest_path.to_path_buf(),
            imports: Vec::new(),
        };
        let importer_dir = manifest_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        for import in std::mem::take(&mut current.imports) {
            if !import.applies(&self.platform) {
                tracing::debug!(
                    path = %import.path,
                    os = ?import.os,
                    arch = ?import.arch,
                    "skipping import: platform constraints not met"
                );
                continue;
            }

            let import_path = self.resolve_import_path(&importer_dir, &import.path)?;
            let (imported, imported_tree) = self.load(&import_path)?;
            merged.merge(imported);
            tree.imports.push(imported_tree);
        }

        merged.merge(current);
        Ok((merged, tree))
    }

    fn resolve_import_path(
        &self,
        importer_dir: &Path,
        raw: &str,
    ) -> Result<PathBuf, ManifestError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ManifestError::EmptyImport);
        }

        let expanded = fsutil::expand_home(trimmed);
        let candidate = if expanded.is_absolute() {
            fsutil::clean_path(&expanded)
        } else {
            fsutil::clean_path(&importer_dir.join(expanded))
        };

        let info = fs::metadata(&candidate)
            .map_err(|e| ManifestError::io(format!("stat import path {}", candidate.display()), e))?;
        let manifest_path = if info.is_dir() {
            find_manifest_file(&candidate)?
        } else {
            candidate
        };

        let canonical = canonical_path(&manifest_path)?;
        if !fsutil::path_within_root(&self.root, &canonical) {
            return Err(ManifestError::EscapesRoot {
                root: self.root.clone(),
                path: canonical,
            });
        }

        Ok(canonical)
    }
}

fn decode_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ManifestError::io(format!("read manifest {}", path.display()), e))?;
    toml::from_str(&content).map_err(|source| ManifestError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn canonical_path(path: &Path) -> Result<PathBuf, ManifestError> {
    let canonical = dunce::canonicalize(path)
        .map_err(|e| ManifestError::io(format!("resolve manifest path {}", path.display()), e))?;
    Ok(fsutil::clean_path(&canonical))
}

fn find_manifest_file(source_dir: &Path) -> Result<PathBuf, ManifestError> {
    let candidate = source_dir.join(MANIFEST_FILE);

    match fs::metadata(&candidate) {
        Ok(info) if info.is_dir() => Err(ManifestError::IsDirectory { path: candidate }),
        Ok(_) => Ok(candidate),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ManifestError::NotFound {
            dir: source_dir.to_path_buf(),
        }),
        Err(e) => Err(ManifestError::io(
            format!("stat manifest candidate {}", candidate.display()),
            e,
        )),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    fn write_manifest(dir: &Path, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), content).unwrap();
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn load_single_manifest_from_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "[source]\nname = \"solo\"\n\n[[link]]\nto = \"vimrc\"\nfrom = \"/home/u/.vimrc\"\n",
        );

        let (m, dir) = load(&path_str(tmp.path())).unwrap();
        assert_eq!(m.source.name, "solo");
        assert_eq!(m.links.len(), 1);
        assert_eq!(dir, fsutil::abs_path(&path_str(tmp.path())).unwrap());
    }

    #[test]
    fn load_accepts_manifest_file_path() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "[source]\nname = \"by-file\"\n");

        let file = tmp.path().join(MANIFEST_FILE);
        let (m, dir) = load(&path_str(&file)).unwrap();
        assert_eq!(m.source.name, "by-file");
        assert!(dir.is_dir());
    }

    #[test]
    fn missing_manifest_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load(&path_str(tmp.path())).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound { .. }));
        assert!(err.to_string().contains(MANIFEST_FILE));
    }

    #[test]
    fn decode_error_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "this is not toml [");
        let err = load(&path_str(tmp.path())).unwrap_err();
        assert!(matches!(err, ManifestError::Decode { .. }));
    }

    #[test]
    fn imports_merge_before_importer_entries() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "[source]\nname = \"root\"\n\n[[import]]\npath = \"shared\"\n\n[[link]]\nto = \"own\"\nfrom = \"/home/u/own\"\n",
        );
        write_manifest(
            &tmp.path().join("shared"),
            "[[link]]\nto = \"shared/item\"\nfrom = \"/home/u/item\"\n",
        );

        let (m, _, tree) = load_with_tree(&path_str(tmp.path())).unwrap();
        assert_eq!(m.links.len(), 2);
        assert_eq!(m.links[0].to, "shared/item");
        assert_eq!(m.links[1].to, "own");
        assert_eq!(m.source.name, "root");
        assert_eq!(tree.imports.len(), 1);
        assert!(tree.imports[0].path.ends_with(Path::new("shared").join(MANIFEST_FILE)));
    }

    #[test]
    fn nested_imports_resolve_relative_to_importer() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "[[import]]\npath = \"a\"\n");
        write_manifest(&tmp.path().join("a"), "[[import]]\npath = \"../b\"\n");
        write_manifest(
            &tmp.path().join("b"),
            "[[dir]]\npath = \"/home/u/.config/deep\"\n",
        );

        let (m, _) = load(&path_str(tmp.path())).unwrap();
        assert_eq!(m.dirs.len(), 1);
    }

    #[test]
    fn platform_filtered_imports_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "[[import]]\npath = \"never\"\nos = [\"plan9\"]\n\n[[import]]\npath = \"always\"\n",
        );
        // The filtered import may point at a manifest that does not even
        // exist; it must never be read.
        write_manifest(&tmp.path().join("always"), "[[dir]]\npath = \"/home/u/d\"\n");

        let (m, _, tree) = load_with_tree(&path_str(tmp.path())).unwrap();
        assert_eq!(m.dirs.len(), 1);
        assert_eq!(tree.imports.len(), 1);
    }

    #[test]
    fn import_cycle_is_fatal_and_reports_chain() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(&tmp.path().join("a"), "[[import]]\npath = \"../b\"\n");
        write_manifest(&tmp.path().join("b"), "[[import]]\npath = \"../a\"\n");
        // Root imports a, a imports b, b imports a again.
        write_manifest(tmp.path(), "[[import]]\npath = \"a\"\n");

        let err = load(&path_str(tmp.path())).unwrap_err();
        let ManifestError::Cycle { chain } = err else {
            panic!("expected cycle error, got: {err}");
        };
        assert!(chain.len() >= 3);
        // The repeated manifest closes the chain: its final element already
        // appears earlier in the stack.
        let last = chain.last().unwrap();
        assert!(chain.iter().rev().skip(1).any(|p| p == last));
        assert!(last.ends_with(Path::new("a").join(MANIFEST_FILE)));
    }

    #[test]
    fn self_import_is_a_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "[[import]]\npath = \".\"\n");

        let err = load(&path_str(tmp.path())).unwrap_err();
        assert!(matches!(err, ManifestError::Cycle { .. }));
    }

    #[test]
    fn import_escaping_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside");
        let root = tmp.path().join("root");
        write_manifest(&outside, "[[dir]]\npath = \"/home/u/x\"\n");
        write_manifest(&root, "[[import]]\npath = \"../outside\"\n");

        let err = load(&path_str(&root)).unwrap_err();
        assert!(matches!(err, ManifestError::EscapesRoot { .. }));
        assert!(err.to_string().contains("escapes source root"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_import_escaping_root_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside");
        let root = tmp.path().join("root");
        write_manifest(&outside, "[[dir]]\npath = \"/home/u/x\"\n");
        write_manifest(&root, "[[import]]\npath = \"inner\"\n");
        // inner/ is a symlink pointing out of the source root.
        std::os::unix::fs::symlink(&outside, root.join("inner")).unwrap();

        let err = load(&path_str(&root)).unwrap_err();
        assert!(matches!(err, ManifestError::EscapesRoot { .. }));
    }

    #[test]
    fn empty_import_path_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "[[import]]\npath = \"  \"\n");

        let err = load(&path_str(tmp.path())).unwrap_err();
        assert!(matches!(err, ManifestError::EmptyImport));
    }

    #[test]
    fn missing_import_target_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(tmp.path(), "[[import]]\npath = \"nowhere\"\n");

        let err = load(&path_str(tmp.path())).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn importer_scalars_win_over_imports() {
        let tmp = tempfile::tempdir().unwrap();
        write_manifest(
            tmp.path(),
            "[source]\nname = \"importer\"\n\n[[import]]\npath = \"sub\"\n",
        );
        write_manifest(
            &tmp.path().join("sub"),
            "[source]\nname = \"imported\"\ndescription = \"from import\"\n",
        );

        let (m, _) = load(&path_str(tmp.path())).unwrap();
        assert_eq!(m.source.name, "importer");
        // The importer sets no description, so the import's survives.
        assert_eq!(m.source.description, "from import");
    }
}
