//! Semantic version parsing and the compatibility gate.
//!
//! Store config files and source manifests both carry a `version` field.
//! A source written for a newer engine, or for a different major version,
//! is refused before any filesystem mutation begins. Empty version strings
//! are treated as compatible for backward compatibility with older files.

use std::fmt;

use crate::error::VersionError;

/// Version of the running engine, used by the compatibility gate.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimal `MAJOR.MINOR.PATCH` semantic version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemVer {
    /// Major version; a mismatch here is always incompatible.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl SemVer {
    /// Parse a version in the form `MAJOR.MINOR.PATCH` with an optional
    /// `v` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::Empty`] for a blank string and
    /// [`VersionError::Invalid`] for anything that is not three dot-separated
    /// non-negative integers.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(VersionError::Empty);
        }

        let value = value.strip_prefix('v').unwrap_or(value);
        let invalid = || VersionError::Invalid {
            raw: raw.to_string(),
        };

        let mut parts = value.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
            patch: patch.parse().map_err(|_| invalid())?,
        })
    }
}

/// Validate that a target version is supported by the running engine.
///
/// Empty versions are compatible. The major versions must match exactly,
/// and the target must not be newer than [`APP_VERSION`].
///
/// # Errors
///
/// Returns a [`VersionError`] describing the first incompatibility found.
pub fn ensure_compatible(target: &str) -> Result<(), VersionError> {
    let value = target.trim();
    if value.is_empty() {
        return Ok(());
    }

    let current = SemVer::parse(APP_VERSION)?;
    let required = SemVer::parse(value)?;

    if required.major != current.major {
        return Err(VersionError::MajorMismatch {
            required: required.major,
            current: current.major,
        });
    }
    if current < required {
        return Err(VersionError::TooNew { required, current });
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_version() {
        let v = SemVer::parse("1.2.3").unwrap();
        assert_eq!(
            v,
            SemVer {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
    }

    #[test]
    fn parse_accepts_v_prefix() {
        let v = SemVer::parse("v0.1.0").unwrap();
        assert_eq!(v.to_string(), "0.1.0");
    }

    #[test]
    fn parse_trims_whitespace() {
        assert!(SemVer::parse("  1.0.0  ").is_ok());
    }

    #[test]
    fn parse_empty_fails() {
        assert!(matches!(SemVer::parse(""), Err(VersionError::Empty)));
        assert!(matches!(SemVer::parse("   "), Err(VersionError::Empty)));
    }

    #[test]
    fn parse_two_part_fails() {
        assert!(matches!(
            SemVer::parse("1.2"),
            Err(VersionError::Invalid { .. })
        ));
    }

    #[test]
    fn parse_four_part_fails() {
        assert!(matches!(
            SemVer::parse("1.2.3.4"),
            Err(VersionError::Invalid { .. })
        ));
    }

    #[test]
    fn parse_negative_fails() {
        assert!(matches!(
            SemVer::parse("1.-2.3"),
            Err(VersionError::Invalid { .. })
        ));
    }

    #[test]
    fn ordering_is_lexicographic_by_field() {
        let a = SemVer::parse("0.1.0").unwrap();
        let b = SemVer::parse("0.2.0").unwrap();
        let c = SemVer::parse("1.0.0").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn empty_target_is_compatible() {
        ensure_compatible("").unwrap();
        ensure_compatible("  ").unwrap();
    }

    #[test]
    fn current_version_is_compatible_with_itself() {
        ensure_compatible(APP_VERSION).unwrap();
    }

    #[test]
    fn different_major_is_rejected() {
        let current = SemVer::parse(APP_VERSION).unwrap();
        let target = format!("{}.0.0", current.major + 1);
        assert!(matches!(
            ensure_compatible(&target),
            Err(VersionError::MajorMismatch { .. })
        ));
    }

    #[test]
    fn newer_minor_in_same_major_is_rejected() {
        let current = SemVer::parse(APP_VERSION).unwrap();
        let target = format!("{}.{}.{}", current.major, current.minor + 1, 0);
        assert!(matches!(
            ensure_compatible(&target),
            Err(VersionError::TooNew { .. })
        ));
    }
}
