//! Declarative source manifests (`tohru.toml`).
//!
//! A manifest names the objects a source wants materialized: symlinks into
//! the source tree, file copies out of it, and bare directories. Manifests
//! may `import` other manifests within the same source root; [`load`]
//! resolves the import graph and returns a single merged manifest.

mod load;

pub use load::{ImportTree, MANIFEST_FILE, load, load_with_tree};

use serde::Deserialize;

use crate::platform::Platform;

/// A decoded manifest, before or after import merging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Engine requirements.
    pub tohru: Tohru,
    /// Source metadata.
    pub source: Source,
    /// Sub-manifests to merge in, resolved before this manifest's own
    /// entries. Consumed during resolution; empty in a merged manifest.
    #[serde(rename = "import")]
    pub imports: Vec<Import>,
    /// Symlinks from a destination path into the source tree.
    #[serde(rename = "link")]
    pub links: Vec<Link>,
    /// File copies from the source tree to a destination path.
    #[serde(rename = "file")]
    pub files: Vec<FileEntry>,
    /// Bare directories to create.
    #[serde(rename = "dir")]
    pub dirs: Vec<DirEntry>,
}

/// `[tohru]` table: engine requirements for this source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Tohru {
    /// Minimum engine version the source requires, if any.
    pub version: String,
}

/// `[source]` table: human-facing metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Source {
    /// Display name; falls back to the source directory name when empty.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// An `[[import]]` declaration with optional platform constraints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Import {
    /// Manifest file or directory, relative to the importing manifest.
    pub path: String,
    /// OS allow-list; empty matches every OS.
    pub os: Vec<String>,
    /// Architecture allow-list; empty matches every architecture.
    pub arch: Vec<String>,
}

impl Import {
    /// Whether this import applies on the given platform.
    #[must_use]
    pub fn applies(&self, platform: &Platform) -> bool {
        let os_ok = self.os.is_empty() || self.os.iter().any(|tag| platform.matches_os(tag));
        let arch_ok =
            self.arch.is_empty() || self.arch.iter().any(|tag| platform.matches_arch(tag));
        os_ok && arch_ok
    }
}

/// An `[[link]]` entry: a symlink at `from` pointing to `to` inside the
/// source tree. Links are always tracked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Link {
    /// Link target, relative to the source root.
    pub to: String,
    /// Link location on the target system.
    pub from: String,
}

/// A `[[file]]` entry: a copy of `source` (in the source tree) at `dest`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileEntry {
    /// File to copy, relative to the source root.
    pub source: String,
    /// Destination on the target system.
    pub dest: String,
    /// Whether the engine records and later reverses this entry.
    pub tracked: Option<bool>,
}

impl FileEntry {
    /// Tracking flag with its default applied (tracked unless opted out).
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracked.unwrap_or(true)
    }
}

/// A `[[dir]]` entry: a directory to create at `path`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirEntry {
    /// Directory to create on the target system.
    pub path: String,
    /// Whether the engine records and later reverses this entry.
    pub tracked: Option<bool>,
}

impl DirEntry {
    /// Tracking flag with its default applied (tracked unless opted out).
    #[must_use]
    pub fn is_tracked(&self) -> bool {
        self.tracked.unwrap_or(true)
    }
}

impl Manifest {
    /// Fold `other` into `self`.
    ///
    /// Entry lists append in order; scalar fields are overwritten only when
    /// `other` supplies a non-empty value. Import resolution merges imported
    /// manifests first and the importing manifest last, so the importer wins
    /// for every field it actually sets, and later imports win over earlier
    /// ones.
    pub fn merge(&mut self, other: Self) {
        if !other.tohru.version.trim().is_empty() {
            self.tohru.version = other.tohru.version;
        }
        if !other.source.name.trim().is_empty() {
            self.source.name = other.source.name;
        }
        if !other.source.description.trim().is_empty() {
            self.source.description = other.source.description;
        }

        self.links.extend(other.links);
        self.files.extend(other.files);
        self.dirs.extend(other.dirs);
    }
}
