//! Current-platform identity used to filter manifest imports.

/// Identity of the running platform, matched against the `os`/`arch`
/// allow-lists on manifest `import` declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    /// Operating system tag (`std::env::consts::OS`).
    pub os: &'static str,
    /// CPU architecture tag (`std::env::consts::ARCH`).
    pub arch: &'static str,
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        }
    }

    /// Create a platform with explicit values (for testing).
    #[cfg(test)]
    pub(crate) const fn new(os: &'static str, arch: &'static str) -> Self {
        Self { os, arch }
    }

    /// Whether `tag` names this platform's operating system.
    ///
    /// Portable dotfile repositories are written against more than one tag
    /// vocabulary, so the common alternative spellings (`darwin`, `amd64`,
    /// `arm64`) are accepted as aliases.
    #[must_use]
    pub fn matches_os(&self, tag: &str) -> bool {
        normalize_os(tag) == normalize_os(self.os)
    }

    /// Whether `tag` names this platform's CPU architecture.
    #[must_use]
    pub fn matches_arch(&self, tag: &str) -> bool {
        normalize_arch(tag) == normalize_arch(self.arch)
    }
}

fn normalize_os(tag: &str) -> &str {
    match tag.trim() {
        "darwin" => "macos",
        other => other,
    }
}

fn normalize_arch(tag: &str) -> &str {
    match tag.trim() {
        "amd64" => "x86_64",
        "arm64" => "aarch64",
        "386" => "x86",
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn current_reports_compile_time_constants() {
        let p = Platform::current();
        assert_eq!(p.os, std::env::consts::OS);
        assert_eq!(p.arch, std::env::consts::ARCH);
    }

    #[test]
    fn matches_os_exact() {
        let p = Platform::new("linux", "x86_64");
        assert!(p.matches_os("linux"));
        assert!(!p.matches_os("windows"));
    }

    #[test]
    fn matches_os_darwin_alias() {
        let p = Platform::new("macos", "aarch64");
        assert!(p.matches_os("darwin"));
        assert!(p.matches_os("macos"));
    }

    #[test]
    fn matches_arch_go_aliases() {
        let p = Platform::new("linux", "x86_64");
        assert!(p.matches_arch("amd64"));
        assert!(p.matches_arch("x86_64"));
        assert!(!p.matches_arch("arm64"));

        let arm = Platform::new("linux", "aarch64");
        assert!(arm.matches_arch("arm64"));
    }

    #[test]
    fn matches_trims_whitespace() {
        let p = Platform::new("linux", "x86_64");
        assert!(p.matches_os(" linux "));
    }
}
