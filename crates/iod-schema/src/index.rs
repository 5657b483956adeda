//! The local package index (`.morphic-packages`).
//!
//! Written once per successful build run into the output directory. The
//! install-on-demand client reads it to find each archive, the exact
//! package-data text that was signed, and the signature.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One built package, as listed in the local index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIndexEntry {
    /// Package name, from the package data embedded in the archive.
    pub name: String,

    /// Archive path relative to the output directory, `/`-separated.
    pub package_file: String,

    /// The package-data JSON exactly as embedded (and signed) in the archive.
    pub package_data: String,

    /// Base64 signature over `package_data`.
    pub package_data_signature: String,

    /// Set when the archive embeds the installer; same value as `package_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer: Option<String>,

    /// Byte offset of the embedded installer inside the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl LocalIndexEntry {
    /// Whether the archive carries its installer inline.
    pub fn has_embedded_installer(&self) -> bool {
        self.installer.is_some()
    }
}

/// The aggregate index of every archive produced by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIndex {
    /// Entries keyed by package name.
    pub packages: BTreeMap<String, LocalIndexEntry>,
}

impl LocalIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry. A later entry with the same name wins.
    pub fn insert(&mut self, entry: LocalIndexEntry) -> Option<LocalIndexEntry> {
        self.packages.insert(entry.name.clone(), entry)
    }

    /// Look up an entry by package name.
    pub fn find(&self, name: &str) -> Option<&LocalIndexEntry> {
        self.packages.get(name)
    }

    /// Number of packages listed.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the index lists no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Render the index file: a header comment with the generation time,
    /// followed by the pretty-printed body.
    ///
    /// The body is plain JSON, which is also valid JSON5.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(&self, generated_at: &str) -> serde_json::Result<String> {
        let body = serde_json::to_string_pretty(self)?;
        Ok(format!(
            "/* Morphic Install on Demand package info ({generated_at}) */\n{body}\n"
        ))
    }

    /// Parse an index file, including its header comment.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON5 or does not match the
    /// index schema.
    pub fn parse(text: &str) -> Result<Self, json5::Error> {
        json5::from_str(text)
    }
}
