// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed store, home directory, and source
// builder so each integration test can set up an isolated environment
// without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};

use tohru::manifest::MANIFEST_FILE;
use tohru::store::{Config, Store};

/// An isolated engine environment: a store, a fake home directory, and
/// room for as many sources as a test needs, all inside one temp dir.
pub struct TestEnv {
    /// Temporary directory backing everything; deleted on drop.
    pub root: tempfile::TempDir,
    /// Installed store rooted at `<root>/store`.
    pub store: Store,
}

impl TestEnv {
    /// Create an environment with an installed store and default config.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let store = Store::new(root.path().join("store"));
        store.install().expect("install store");
        fs::create_dir_all(root.path().join("home")).expect("create home dir");
        Self { root, store }
    }

    /// Create an environment and adjust the persisted config first.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let env = Self::new();
        let mut cfg = env.store.load_config().expect("load config");
        configure(&mut cfg);
        env.store.save_config(&cfg).expect("save config");
        env
    }

    /// The fake home directory destinations live under.
    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    /// A destination path under the fake home directory.
    pub fn target(&self, rel: &str) -> PathBuf {
        self.home().join(rel)
    }

    /// Directory a named source lives in.
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Write a source's manifest and return the source path as a string
    /// suitable for `Store::load`.
    pub fn write_source(&self, name: &str, manifest: &str) -> String {
        let dir = self.source_dir(name);
        fs::create_dir_all(&dir).expect("create source dir");
        fs::write(dir.join(MANIFEST_FILE), manifest).expect("write manifest");
        dir.to_string_lossy().into_owned()
    }

    /// Write a payload file inside a source directory.
    pub fn write_source_file(&self, source: &str, rel: &str, content: &str) {
        let path = self.source_dir(source).join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create payload parent");
        }
        fs::write(&path, content).expect("write payload file");
    }

    /// Recursively snapshot a directory tree as `(relative path, content)`
    /// pairs, using the symlink target as content for symlinks. Useful for
    /// before/after comparisons around a rolled-back load.
    pub fn snapshot_tree(&self, root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut out = Vec::new();
        collect_tree(root, root, &mut out);
        out.sort();
        out
    }
}

fn collect_tree(root: &Path, dir: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) {
    for entry in fs::read_dir(dir).expect("read dir") {
        let entry = entry.expect("read entry");
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .expect("entry under root")
            .to_path_buf();
        let ftype = entry.file_type().expect("stat entry");

        if ftype.is_symlink() {
            let target = fs::read_link(&path).expect("read link");
            out.push((rel, target.to_string_lossy().into_owned().into_bytes()));
        } else if ftype.is_dir() {
            out.push((rel.clone(), Vec::new()));
            collect_tree(root, &path, out);
        } else {
            out.push((rel, fs::read(&path).expect("read file")));
        }
    }
}
