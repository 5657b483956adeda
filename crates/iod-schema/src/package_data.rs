//! Package-data documents.
//!
//! The package-data document is the metadata that gets embedded in, and
//! signed inside, a package archive. Its shape is open-ended; the builder
//! only requires a non-empty string `name`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::types::PackageName;

/// Errors raised while loading or validating a package-data document.
#[derive(Error, Debug)]
pub enum PackageDataError {
    /// The document text is not valid JSON/JSON5.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The document is valid but its root is not an object.
    #[error("Package data must be an object")]
    NotAnObject,

    /// The document has no `name`, or `name` is empty or not a string.
    #[error("Package data does not contain a 'name' field")]
    MissingName,
}

/// A validated, read-only package-data document.
///
/// The document is shared behind an [`Arc`] and no mutable access is
/// exposed, so every component downstream of the resolver sees exactly
/// what was loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageData {
    name: PackageName,
    document: Arc<Map<String, Value>>,
}

impl PackageData {
    /// Validate an already-parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`PackageDataError::NotAnObject`] if the root is not an
    /// object, or [`PackageDataError::MissingName`] if `name` is absent,
    /// empty, or not a string.
    pub fn from_value(value: Value) -> Result<Self, PackageDataError> {
        let Value::Object(document) = value else {
            return Err(PackageDataError::NotAnObject);
        };

        let name = match document.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => PackageName::new(name.as_str()),
            _ => return Err(PackageDataError::MissingName),
        };

        Ok(Self {
            name,
            document: Arc::new(document),
        })
    }

    /// Parse a relaxed (JSON5) document, as written by package authors.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON5 or fails validation.
    pub fn parse_relaxed(text: &str) -> Result<Self, PackageDataError> {
        let value: Value =
            json5::from_str(text).map_err(|e| PackageDataError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse strict JSON, as embedded inside a package archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON or fails validation.
    pub fn parse_json(text: &str) -> Result<Self, PackageDataError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| PackageDataError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// The package name declared by the document.
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The full document.
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Look up a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    /// Serialize the document as compact JSON, the form that gets signed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self.document.as_ref())
    }
}

impl Serialize for PackageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.document.serialize(serializer)
    }
}
