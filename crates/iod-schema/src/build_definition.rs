//! The per-package build definition (`build.json5`).

use serde::{Deserialize, Serialize};

use crate::types::InstallerRef;

/// Default package-data file name when a build definition does not name one.
pub const DEFAULT_PACKAGE_DATA_FILE: &str = "packageData.json";

/// A per-package build definition (`build.json` / `build.json5`).
///
/// ```text
/// {
///   packageData: "packageData.json5",
///   installer: "https://example.com/setup.msi",
///   category: "readers",
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDefinition {
    /// Package-data file, relative to the definition's directory.
    #[serde(default = "default_package_data")]
    pub package_data: String,

    /// Installer path (relative to the definition's directory) or URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer: Option<String>,

    /// Sub-directory of the output directory for the built archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Informational only; the package-data `name` always wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

fn default_package_data() -> String {
    DEFAULT_PACKAGE_DATA_FILE.to_string()
}

impl BuildDefinition {
    /// Parse a build definition from relaxed (JSON5) text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON5 or does not match the
    /// build definition schema.
    pub fn parse(text: &str) -> Result<Self, json5::Error> {
        json5::from_str(text)
    }

    /// The installer reference, classified as URL or path.
    ///
    /// Blank entries are treated as "no installer".
    pub fn installer_ref(&self) -> Option<InstallerRef> {
        self.installer
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(InstallerRef::parse)
    }

    /// The output category, with blank values treated as absent.
    pub fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
