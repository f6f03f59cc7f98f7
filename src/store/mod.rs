//! The tohru store: a directory owning configuration, lock state, and the
//! content-addressed backup objects.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/config.toml            — engine configuration
//! <root>/lock.json              — durable lock state
//! <root>/backups/<digest>/object — backup objects, keyed by digest
//! ```
//!
//! The root defaults to `<user config dir>/tohru` and can be overridden
//! with the `TOHRU_STORE_DIR` environment variable. Config and lock writes
//! go through a temp file and an atomic rename so a crash never exposes a
//! partial file.

pub mod backup;
pub mod config;
pub mod lock;
pub mod ops;
pub mod status;
mod txn;
pub mod validate;

pub use backup::BackupStore;
pub use config::Config;
pub use lock::{AutoDir, LoadState, Lock, ManagedFile, SourceRef, TrackedObject};
pub use ops::{LoadResult, Operation, Options, TidyResult, UnloadResult};
pub use status::{BackupRefStatus, StatusSnapshot, TrackedStatus};
pub use validate::ValidateResult;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StoreError;
use crate::fsutil;
use crate::version;

const DIR_NAME: &str = "tohru";
const CONFIG_FILE: &str = "config.toml";
const LOCK_FILE: &str = "lock.json";
const BACKUPS_DIR: &str = "backups";

/// Environment variable overriding the store root directory.
pub const ENV_STORE_DIR: &str = "TOHRU_STORE_DIR";

/// Handle to a store root on the local filesystem.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Create a handle for an explicit root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the default store location: `TOHRU_STORE_DIR` if set,
    /// otherwise `<user config dir>/tohru`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither an override nor a user config directory
    /// is available.
    pub fn default_store() -> Result<Self, StoreError> {
        if let Ok(custom) = std::env::var(ENV_STORE_DIR)
            && !custom.trim().is_empty()
        {
            return Ok(Self::new(fsutil::abs_path(&custom)?));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("resolve user config directory"))?;
        Ok(Self::new(config_dir.join(DIR_NAME)))
    }

    /// The store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the persisted configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Path of the persisted lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Path of the backup objects directory.
    #[must_use]
    pub fn backups_path(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    /// Handle to the content-addressed backup store.
    #[must_use]
    pub fn backups(&self) -> BackupStore {
        BackupStore::new(self.backups_path())
    }

    /// Whether the store has been initialized (config and lock both exist).
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.config_path().is_file() && self.lock_path().is_file()
    }

    /// Initialize the store, failing if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyInstalled`] when config and lock are
    /// already present, or an I/O error if creation fails.
    pub fn install(&self) -> Result<(), StoreError> {
        if self.is_installed() {
            return Err(StoreError::AlreadyInstalled);
        }
        self.install_missing()
    }

    /// Initialize any missing store files, leaving existing ones alone.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if creation fails.
    pub fn ensure_installed(&self) -> Result<(), StoreError> {
        self.install_missing()
    }

    fn install_missing(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.backups_path())
            .map_err(|e| StoreError::io("create store directories", e))?;

        if !self.config_path().is_file() {
            write_toml(&self.config_path(), &Config::default())?;
        }
        if !self.lock_path().is_file() {
            write_json(&self.lock_path(), &Lock::default())?;
        }
        Ok(())
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing and gating on its version field.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be decoded or was written by
    /// an incompatible engine version.
    pub fn load_config(&self) -> Result<Config, StoreError> {
        let path = self.config_path();
        let mut cfg = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<Config>(&content).map_err(|e| {
                StoreError::io(
                    format!("decode {}", path.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                )
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(StoreError::io(format!("read {}", path.display()), e)),
        };

        if cfg.tohru.version.trim().is_empty() {
            cfg.tohru.version = version::APP_VERSION.to_string();
        }
        version::ensure_compatible(&cfg.tohru.version).map_err(|source| {
            StoreError::UnsupportedVersion {
                subject: "config",
                version: cfg.tohru.version.clone(),
                source,
            }
        })?;

        Ok(cfg)
    }

    /// Persist the configuration atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when encoding or the atomic write fails.
    pub fn save_config(&self, cfg: &Config) -> Result<(), StoreError> {
        let mut cfg = cfg.clone();
        if cfg.tohru.version.trim().is_empty() {
            cfg.tohru.version = version::APP_VERSION.to_string();
        }
        write_toml(&self.config_path(), &cfg)
    }

    /// Load the lock state, falling back to the default unloaded lock when
    /// the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be decoded.
    pub fn load_lock(&self) -> Result<Lock, StoreError> {
        let path = self.lock_path();
        let mut lck = match fs::File::open(&path) {
            Ok(file) => serde_json::from_reader::<_, Lock>(std::io::BufReader::new(file))
                .map_err(|e| {
                    StoreError::io(
                        format!("decode {}", path.display()),
                        std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                    )
                })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Lock::default(),
            Err(e) => return Err(StoreError::io(format!("open {}", path.display()), e)),
        };

        if lck.source.kind.trim().is_empty() {
            lck.source.kind = lock::SOURCE_KIND_LOCAL.to_string();
        }

        Ok(lck)
    }

    /// Persist the lock state atomically.
    ///
    /// # Errors
    ///
    /// Returns an error when encoding or the atomic write fails.
    pub fn save_lock(&self, lck: &Lock) -> Result<(), StoreError> {
        write_json(&self.lock_path(), lck)
    }
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded = toml::to_string(value)
        .map_err(|e| StoreError::Other(anyhow::anyhow!("encode {}: {e}", path.display())))?;
    write_atomic(path, encoded.as_bytes())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let encoded = serde_json::to_vec(value)
        .map_err(|e| StoreError::Other(anyhow::anyhow!("encode {}: {e}", path.display())))?;
    write_atomic(path, &encoded)
}

// Write-to-temp-then-rename: the only atomicity primitive the engine
// relies on.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| StoreError::io(format!("create directory for {}", path.display()), e))?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    fs::write(&tmp, data).map_err(|e| StoreError::io(format!("write {}", tmp.display()), e))?;

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(format!("replace {}", path.display()), e));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let store = Store::new(tmp.path().join("store"));
        (tmp, store)
    }

    #[test]
    fn install_creates_layout_and_defaults() {
        let (_tmp, store) = temp_store();
        assert!(!store.is_installed());

        store.install().unwrap();
        assert!(store.is_installed());
        assert!(store.backups_path().is_dir());

        let cfg = store.load_config().unwrap();
        assert!(cfg.options.backup && cfg.options.clean);
        let lck = store.load_lock().unwrap();
        assert!(!lck.is_loaded());
    }

    #[test]
    fn install_twice_fails() {
        let (_tmp, store) = temp_store();
        store.install().unwrap();
        assert!(matches!(
            store.install(),
            Err(StoreError::AlreadyInstalled)
        ));
    }

    #[test]
    fn ensure_installed_preserves_existing_files() {
        let (_tmp, store) = temp_store();
        store.install().unwrap();

        let mut cfg = store.load_config().unwrap();
        cfg.options.backup = false;
        store.save_config(&cfg).unwrap();

        store.ensure_installed().unwrap();
        assert!(!store.load_config().unwrap().options.backup);
    }

    #[test]
    fn load_config_defaults_when_missing() {
        let (_tmp, store) = temp_store();
        let cfg = store.load_config().unwrap();
        assert!(cfg.options.backup);
    }

    #[test]
    fn incompatible_config_version_is_fatal() {
        let (_tmp, store) = temp_store();
        store.install().unwrap();
        fs::write(
            store.config_path(),
            "[tohru]\nversion = \"99.0.0\"\n[options]\nbackup = true\nclean = true\n",
        )
        .unwrap();

        assert!(matches!(
            store.load_config(),
            Err(StoreError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn lock_round_trips() {
        let (_tmp, store) = temp_store();
        store.install().unwrap();

        let mut lck = Lock::default();
        lck.source.state = LoadState::Loaded;
        lck.source.loc = "/srv/src".into();
        store.save_lock(&lck).unwrap();

        let back = store.load_lock().unwrap();
        assert!(back.is_loaded());
        assert_eq!(back.source.loc, "/srv/src");
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let (_tmp, store) = temp_store();
        store.install().unwrap();
        store.save_lock(&Lock::default()).unwrap();

        let entries: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(
            entries.iter().all(|name| !name.ends_with(".tmp")),
            "unexpected temp files: {entries:?}"
        );
    }
}
