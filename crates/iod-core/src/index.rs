//! Local index aggregation.
//!
//! After a completed run, every archive is read back and summarised into a
//! [`LocalIndex`], which is written to `<output>/.morphic-packages`.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use iod_schema::{INDEX_FILE_NAME, LocalIndex, LocalIndexEntry, PackageName};

use crate::archive::{ArchiveError, PackageArchive};
use crate::paths::relative_slash_path;
use crate::task::BuildTask;

/// Errors from aggregating, writing or loading the local index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// A produced archive could not be read back.
    #[error("Unable to read archive {}: {source}", .path.display())]
    Archive {
        /// The archive.
        path: PathBuf,
        /// Read failure.
        #[source]
        source: ArchiveError,
    },

    /// An archive names a different package than its task.
    #[error("Archive {} names package '{actual}', expected '{expected}'", .path.display())]
    NameMismatch {
        /// The archive.
        path: PathBuf,
        /// Task name.
        expected: PackageName,
        /// Name in the archive.
        actual: PackageName,
    },

    /// A task reached aggregation without an archive.
    #[error("Package '{name}' has no archive")]
    NotBuilt {
        /// The task's package name.
        name: PackageName,
    },

    /// An archive path is not under the output directory.
    #[error("Archive {} is outside the output directory", .path.display())]
    OutsideOutput {
        /// The archive.
        path: PathBuf,
    },

    /// The index file could not be written or read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The index could not be rendered.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The index file on disk is not valid JSON5.
    #[error("Invalid index file: {0}")]
    Parse(String),
}

/// Location of the index file in an output directory.
pub fn index_path(output_dir: &Path) -> PathBuf {
    output_dir.join(INDEX_FILE_NAME)
}

/// Builds the local index from completed tasks.
pub struct IndexAggregator<'a> {
    archive: &'a dyn PackageArchive,
    output_dir: &'a Path,
}

impl std::fmt::Debug for IndexAggregator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexAggregator")
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl<'a> IndexAggregator<'a> {
    /// Aggregate with `archive`, recording paths relative to `output_dir`.
    pub fn new(archive: &'a dyn PackageArchive, output_dir: &'a Path) -> Self {
        Self {
            archive,
            output_dir,
        }
    }

    /// Read every produced archive and build index entries from what is
    /// actually on disk.
    ///
    /// # Errors
    ///
    /// Fails if a task has no archive, an archive cannot be read, or its
    /// embedded name differs from the task's.
    pub async fn aggregate(&self, tasks: &[BuildTask]) -> Result<LocalIndex, IndexError> {
        let mut index = LocalIndex::new();

        for task in tasks {
            let path = task
                .produced_archive
                .as_ref()
                .ok_or_else(|| IndexError::NotBuilt {
                    name: task.name.clone(),
                })?;
            let entry = self.entry_for(&task.name, path).await?;

            if let Some(previous) = index.insert(entry) {
                debug!(
                    package = %previous.name,
                    replaced = %previous.package_file,
                    "index entry replaced"
                );
            }
        }

        debug!(packages = index.len(), "aggregated index");
        Ok(index)
    }

    async fn entry_for(
        &self,
        expected: &PackageName,
        path: &Path,
    ) -> Result<LocalIndexEntry, IndexError> {
        let info = self
            .archive
            .read(path)
            .await
            .map_err(|source| IndexError::Archive {
                path: path.to_path_buf(),
                source,
            })?;

        let actual = info.package_data.name();
        if actual != expected {
            return Err(IndexError::NameMismatch {
                path: path.to_path_buf(),
                expected: expected.clone(),
                actual: actual.clone(),
            });
        }

        let package_file =
            relative_slash_path(path, self.output_dir).ok_or_else(|| IndexError::OutsideOutput {
                path: path.to_path_buf(),
            })?;

        let (installer, offset) = if info.header.has_installer() {
            (Some(package_file.clone()), info.header.installer_offset)
        } else {
            (None, None)
        };

        Ok(LocalIndexEntry {
            name: actual.to_string(),
            package_data_signature: info.signature_base64(),
            package_data: info.package_data_json,
            package_file,
            installer,
            offset,
        })
    }
}

/// Write `index` to `<output_dir>/.morphic-packages`, replacing any
/// previous index.
///
/// The file is written to a temporary path first and renamed, so readers
/// never see a partial index.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub async fn write_index(index: &LocalIndex, output_dir: &Path) -> Result<PathBuf, IndexError> {
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let content = index.render(&generated_at)?;

    fs::create_dir_all(output_dir).await?;
    let path = index_path(output_dir);
    let temp_path = output_dir.join(format!("{INDEX_FILE_NAME}.tmp"));
    fs::write(&temp_path, &content).await?;
    fs::rename(&temp_path, &path).await?;

    info!(packages = index.len(), "wrote {}", path.display());
    Ok(path)
}

/// Load a previously written index.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub async fn load_index(output_dir: &Path) -> Result<LocalIndex, IndexError> {
    let content = fs::read_to_string(index_path(output_dir)).await?;
    LocalIndex::parse(&content).map_err(|e| IndexError::Parse(e.to_string()))
}
