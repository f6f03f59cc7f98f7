//! Content addressing for filesystem objects.
//!
//! A [`Digest`] is a typed fingerprint `"<kind>:<algorithm>:<sum>"` computed
//! over a file's bytes, a symlink's target string, or a directory's sorted
//! entry records. Digest equality is the sole mechanism for drift detection
//! and backup-object deduplication, so the directory scheme must be stable:
//! two directories with identical structure and content hash identically
//! regardless of creation or traversal order.

use std::fmt;
use std::fs;
use std::io::Read as _;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use crate::error::DigestError;

/// Hash algorithm tag used for all digests this engine produces.
pub const ALGORITHM_SHA256: &str = "sha256";

/// Kind of filesystem object a digest was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// No object (a recorded absence).
    Null,
    /// Regular file; sum covers the byte stream.
    File,
    /// Directory; sum covers the sorted entry records.
    Dir,
    /// Symlink; sum covers the target string.
    Symlink,
}

impl Kind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::File => "file",
            Self::Dir => "dir",
            Self::Symlink => "symlink",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "file" => Ok(Self::File),
            "dir" => Ok(Self::Dir),
            "symlink" => Ok(Self::Symlink),
            other => Err(DigestError::UnsupportedKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Typed digest value, serialized as `"<kind>:<algorithm>:<sum>"`.
///
/// The all-empty value is the *zero* digest ("no digest") and serializes to
/// the empty string; the null digest (`kind = null`, no algorithm or sum)
/// serializes to the literal `"null"`. Two digests are equal iff their
/// serialized forms are equal, which the derived equality matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digest {
    kind: Option<Kind>,
    algorithm: String,
    sum: String,
}

impl Digest {
    /// Construct a digest, validating the kind/field invariants.
    ///
    /// # Errors
    ///
    /// Returns an error when a null digest carries an algorithm or sum, or
    /// a non-null digest is missing either.
    pub fn new(kind: Kind, algorithm: &str, sum: &str) -> Result<Self, DigestError> {
        if kind == Kind::Null {
            if !algorithm.trim().is_empty() || !sum.trim().is_empty() {
                return Err(DigestError::NullWithFields);
            }
            return Ok(Self {
                kind: Some(Kind::Null),
                algorithm: String::new(),
                sum: String::new(),
            });
        }

        if algorithm.trim().is_empty() {
            return Err(DigestError::MissingAlgorithm);
        }
        if sum.trim().is_empty() {
            return Err(DigestError::MissingSum);
        }

        Ok(Self {
            kind: Some(kind),
            algorithm: algorithm.trim().to_string(),
            sum: sum.trim().to_string(),
        })
    }

    /// The zero digest: no kind, no algorithm, no sum.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            kind: None,
            algorithm: String::new(),
            sum: String::new(),
        }
    }

    /// Whether this is the zero digest.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.kind.is_none() && self.algorithm.is_empty() && self.sum.is_empty()
    }

    /// Kind of object this digest covers, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<Kind> {
        self.kind
    }

    /// Parse the serialized form. The empty string yields the zero digest.
    ///
    /// # Errors
    ///
    /// Returns an error for anything other than `""`, `"null"`, or a valid
    /// `kind:algorithm:sum` triple.
    pub fn parse(raw: &str) -> Result<Self, DigestError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::zero());
        }
        if raw == Kind::Null.as_str() {
            return Self::new(Kind::Null, "", "");
        }

        let mut parts = raw.split(':');
        let (Some(kind), Some(algorithm), Some(sum), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(DigestError::Malformed {
                raw: raw.to_string(),
            });
        };

        Self::new(kind.parse()?, algorithm, sum)
    }

    /// Compute the digest of the object at `path` without following
    /// symlinks.
    ///
    /// # Errors
    ///
    /// Returns an error when the path cannot be read or names an object
    /// type other than file, directory, or symlink.
    pub fn for_path(path: &Path) -> Result<Self, DigestError> {
        let meta = fs::symlink_metadata(path)
            .map_err(|e| DigestError::io(format!("stat {}", path.display()), e))?;
        let ftype = meta.file_type();

        if ftype.is_symlink() {
            let target = fs::read_link(path)
                .map_err(|e| DigestError::io(format!("read symlink {}", path.display()), e))?;
            let mut hasher = Sha256::new();
            hasher.update(target.to_string_lossy().as_bytes());
            Self::new(Kind::Symlink, ALGORITHM_SHA256, &hex(hasher.finalize().as_slice()))
        } else if ftype.is_file() {
            Self::new(Kind::File, ALGORITHM_SHA256, &hash_file(path)?)
        } else if ftype.is_dir() {
            Self::new(Kind::Dir, ALGORITHM_SHA256, &hash_dir(path)?)
        } else {
            Err(DigestError::UnsupportedFileType {
                path: path.to_path_buf(),
            })
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            None => Ok(()),
            Some(Kind::Null) => f.write_str(Kind::Null.as_str()),
            Some(kind) => write!(f, "{kind}:{}:{}", self.algorithm, self.sum),
        }
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn hash_file(path: &Path) -> Result<String, DigestError> {
    let mut file = fs::File::open(path)
        .map_err(|e| DigestError::io(format!("open file {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| DigestError::io(format!("hash file {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(buf.get(..n).unwrap_or_default());
    }

    Ok(hex(hasher.finalize().as_slice()))
}

struct DirRecord {
    rel: String,
    kind: &'static str,
    payload: String,
}

// One record per descendant: (slash-separated relative path, type, payload)
// where payload is a symlink target, a file's own hash, or empty for
// sub-directories. Records are sorted by relative path before hashing so
// traversal order never leaks into the digest.
fn hash_dir(root: &Path) -> Result<String, DigestError> {
    let mut records = Vec::with_capacity(32);
    collect_dir_records(root, root, &mut records)?;
    records.sort_by(|a, b| a.rel.cmp(&b.rel));

    let mut hasher = Sha256::new();
    for rec in &records {
        hasher.update(rec.rel.as_bytes());
        hasher.update(b"\n");
        hasher.update(rec.kind.as_bytes());
        hasher.update(b"\n");
        hasher.update(rec.payload.as_bytes());
        hasher.update(b"\n");
    }

    Ok(hex(hasher.finalize().as_slice()))
}

fn collect_dir_records(
    root: &Path,
    dir: &Path,
    out: &mut Vec<DirRecord>,
) -> Result<(), DigestError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| DigestError::io(format!("walk directory {}", dir.display()), e))?;

    for entry in entries {
        let entry = entry
            .map_err(|e| DigestError::io(format!("walk directory {}", dir.display()), e))?;
        let path = entry.path();
        let rel = relative_slash_path(root, &path);
        let ftype = entry
            .file_type()
            .map_err(|e| DigestError::io(format!("stat {}", path.display()), e))?;

        if ftype.is_symlink() {
            let target = fs::read_link(&path)
                .map_err(|e| DigestError::io(format!("read symlink {}", path.display()), e))?;
            out.push(DirRecord {
                rel,
                kind: "symlink",
                payload: target.to_string_lossy().into_owned(),
            });
        } else if ftype.is_file() {
            out.push(DirRecord {
                rel,
                kind: "file",
                payload: hash_file(&path)?,
            });
        } else if ftype.is_dir() {
            out.push(DirRecord {
                rel,
                kind: "dir",
                payload: String::new(),
            });
            collect_dir_records(root, &path, out)?;
        } else {
            return Err(DigestError::UnsupportedFileType { path });
        }
    }

    Ok(())
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn hex(bytes: &[u8]) -> String {
    use fmt::Write as _;
    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
