//! Package archive format seam.
//!
//! The pipeline only talks to archives through [`PackageArchive`]: one call
//! to create an archive, one to read it back. [`PackageFile`] is the
//! `.morphic-package` implementation used by the command-line tool; tests
//! plug in their own.

pub mod package_file;

pub use package_file::PackageFile;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use iod_schema::{PackageData, PackageDataError};

use crate::keys::KeyPair;

/// Errors from writing, reading or verifying package archives.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Reading or writing the archive file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key decryption, signing or verification failed in openssl.
    #[error("Signing failed (wrong passphrase?): {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    /// The file is not a well-formed package archive.
    #[error("Malformed package file {}: {reason}", .path.display())]
    Malformed {
        /// The archive being read.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// The signed package data is not a valid document.
    #[error("Invalid embedded package data: {0}")]
    PackageData(#[from] PackageDataError),

    /// The archive header could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A key file has no PEM block, or its base64 body is invalid.
    #[error("Invalid PEM: {0}")]
    Pem(String),
}

impl ArchiveError {
    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// The fixed-size-prefixed header at the start of every package file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveHeader {
    /// Format version.
    pub version: u32,
    /// Length of the embedded package-data JSON.
    pub package_data_length: u64,
    /// Length of the signature over the package data.
    pub signature_length: u64,
    /// Length of the embedded installer, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_length: Option<u64>,
    /// Absolute offset of the embedded installer, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_offset: Option<u64>,
}

impl ArchiveHeader {
    /// Whether the archive carries an installer payload.
    pub fn has_installer(&self) -> bool {
        self.installer_length.is_some()
    }
}

/// Everything read back from an archive, except the installer payload.
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    /// Parsed header.
    pub header: ArchiveHeader,
    /// The package-data JSON exactly as stored (the signed bytes).
    pub package_data_json: String,
    /// The parsed package data.
    pub package_data: PackageData,
    /// Detached signature over `package_data_json`.
    pub signature: Vec<u8>,
    /// Path the archive was read from.
    pub path: PathBuf,
}

impl ArchiveInfo {
    /// The signature, base64 encoded.
    pub fn signature_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.signature)
    }
}

/// Creates and reads signed package archives.
#[async_trait]
pub trait PackageArchive: Send + Sync {
    /// Write a signed archive for `package_data` to `output`, embedding the
    /// installer if one is given. Returns the path written.
    ///
    /// # Errors
    ///
    /// Fails if the key cannot sign or the archive cannot be written.
    async fn create(
        &self,
        package_data: &PackageData,
        installer: Option<&Path>,
        key_pair: &KeyPair,
        output: &Path,
    ) -> Result<PathBuf, ArchiveError>;

    /// Read an archive's header, package data, and signature.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing or not a well-formed archive.
    async fn read(&self, archive: &Path) -> Result<ArchiveInfo, ArchiveError>;
}

/// Decode the first PEM block in `text` into its DER bytes.
///
/// Lines before the `-----BEGIN` marker (such as a fingerprint comment)
/// and RFC 1421 header lines inside the block are skipped.
///
/// # Errors
///
/// Returns [`ArchiveError::Pem`] if no complete block is found or the body
/// is not valid base64.
pub fn read_pem(text: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let text = String::from_utf8_lossy(text);
    let mut lines = text
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.starts_with("-----BEGIN "));

    if lines.next().is_none() {
        return Err(ArchiveError::Pem("no BEGIN marker".to_string()));
    }

    let mut body = String::new();
    let mut closed = false;
    for line in lines {
        if line.starts_with("-----END ") {
            closed = true;
            break;
        }
        if line.is_empty() || line.contains(':') {
            continue;
        }
        body.push_str(line);
    }

    if !closed {
        return Err(ArchiveError::Pem("no END marker".to_string()));
    }

    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| ArchiveError::Pem(e.to_string()))
}
