//! Shared types and on-disk formats for install-on-demand package builds.
//!
//! Everything here is plain data: build definitions, package-data documents,
//! the local package index, and the key fingerprint. The builder in
//! `iod-core` produces these; install-on-demand clients consume them.

pub mod build_definition;
pub mod hash;
pub mod index;
pub mod package_data;
pub mod types;

// Re-exports
pub use build_definition::BuildDefinition;
pub use hash::Fingerprint;
pub use index::{LocalIndex, LocalIndexEntry};
pub use package_data::{PackageData, PackageDataError};
pub use types::*;

/// File extension of a built package archive (without the leading dot).
pub const ARCHIVE_EXTENSION: &str = "morphic-package";

/// File name of the local package index written into the output directory.
pub const INDEX_FILE_NAME: &str = ".morphic-packages";
