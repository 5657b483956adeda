//! Package names and installer references.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::path::PathBuf;

/// Name of a package, as declared by its package-data document.
///
/// Package names are kept verbatim (no case folding): they
/// become archive file names and index keys, and the install-on-demand
/// client looks them up exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Where a package's installer comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallerRef {
    /// Remote installer, fetched over HTTP(S) into the download cache.
    Url(String),
    /// Local installer, relative to the build definition's directory.
    Path(PathBuf),
}

impl InstallerRef {
    /// Classify a raw installer reference from a build definition.
    ///
    /// Anything starting with `http://` or `https://` is a URL; everything
    /// else is treated as a filesystem path.
    ///
    /// # Example
    ///
    /// ```
    /// use iod_schema::InstallerRef;
    ///
    /// assert!(matches!(InstallerRef::parse("https://example.com/a.msi"), InstallerRef::Url(_)));
    /// assert!(matches!(InstallerRef::parse("setup.exe"), InstallerRef::Path(_)));
    /// ```
    pub fn parse(raw: &str) -> Self {
        if is_remote(raw) {
            Self::Url(raw.to_string())
        } else {
            Self::Path(PathBuf::from(raw))
        }
    }

    /// Whether this installer must be downloaded.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

impl std::fmt::Display for InstallerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

fn is_remote(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_is_case_preserving() {
        let name = PackageName::from("JAWS");
        assert_eq!(name.as_str(), "JAWS");
        assert_ne!(name, PackageName::from("jaws"));
    }

    #[test]
    fn installer_ref_classifies_urls() {
        assert_eq!(
            InstallerRef::parse("http://example.com/x.exe"),
            InstallerRef::Url("http://example.com/x.exe".to_string())
        );
        assert!(InstallerRef::parse("HTTPS://EXAMPLE.COM/x").is_remote());
        assert_eq!(
            InstallerRef::parse("installers/x.msi"),
            InstallerRef::Path(PathBuf::from("installers/x.msi"))
        );
        assert!(!InstallerRef::parse("ftp://example.com/x").is_remote());
    }
}
