//! Domain-specific errors for build runs

use std::path::PathBuf;
use thiserror::Error;

use iod_schema::{PackageDataError, PackageName};

use crate::archive::ArchiveError;
use crate::index::IndexError;
use crate::io::download::DownloadError;
use crate::keys::KeyError;

/// Problems with how the run was configured. Reported before any build
/// work starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or both key files are missing for a build.
    #[error(
        "Key pair files do not exist: '{}' and '{}'. Generate using --keygen, or specify using --key.",
        .private.display(),
        .public.display()
    )]
    MissingKeys {
        /// Expected private key file.
        private: PathBuf,
        /// Expected public key file.
        public: PathBuf,
    },

    /// Key generation would overwrite an existing key file.
    #[error(
        "A key already exists ({}). Before generating a new one, think about what you're doing.",
        .path.display()
    )]
    KeysExist {
        /// The key file that is already present.
        path: PathBuf,
    },

    /// No passphrase, or an empty one, was supplied.
    #[error("No key passphrase given: use --keypass.")]
    MissingPassphrase,

    /// A `file:` passphrase could not be read.
    #[error("Unable to read passphrase file '{}': {source}", .path.display())]
    PassphraseFile {
        /// The passphrase file.
        path: PathBuf,
        /// Underlying read failure.
        #[source]
        source: std::io::Error,
    },

    /// Nothing was selected, or the selection resolved to no packages.
    #[error("No packages specified: use --packages, --all, or a package list.")]
    NoPackages,
}

/// Failures while discovering and loading build definitions.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A named package, path or definition does not exist.
    #[error("File not found: {}", .path.display())]
    MissingFile {
        /// The path that was looked for.
        path: PathBuf,
    },

    /// A definition, package-data or list file could not be read.
    #[error("Unable to read {}: {source}", .path.display())]
    Read {
        /// The file being read.
        path: PathBuf,
        /// Underlying read failure.
        #[source]
        source: std::io::Error,
    },

    /// A build definition is not valid JSON5 or has the wrong shape.
    #[error("Invalid build definition {}: {message}", .path.display())]
    Definition {
        /// The definition file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A package-list file is not a JSON5 array of strings.
    #[error("Invalid package list {}: {message}", .path.display())]
    PackageList {
        /// The list file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A package-data document failed to parse or has no name.
    #[error("Invalid package data {}: {source}", .path.display())]
    PackageData {
        /// The package-data file.
        path: PathBuf,
        /// What was wrong with it.
        #[source]
        source: PackageDataError,
    },

    /// A package-list entry is not a usable glob.
    #[error("Invalid glob pattern '{pattern}': {message}")]
    Glob {
        /// The offending pattern.
        pattern: String,
        /// Pattern error message.
        message: String,
    },

    /// Recursive discovery hit an unreadable directory.
    #[error("Unable to scan source directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Failures while building a single package.
#[derive(Error, Debug)]
pub enum TaskError {
    /// The installer could not be fetched.
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),

    /// The archive could not be written or read back.
    #[error("Archive failed: {0}")]
    Archive(#[from] ArchiveError),

    /// The archive's parent directory could not be created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive read back names a different package.
    #[error("Archive {} contains package '{actual}', expected '{expected}'", .path.display())]
    NameMismatch {
        /// The archive that was read back.
        path: PathBuf,
        /// Name of the task being built.
        expected: PackageName,
        /// Name found in the archive.
        actual: PackageName,
    },
}

/// Top-level error for a build or key-generation run.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Package selection or definition problem.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Key loading or generation problem.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The first package that failed; the run stopped here.
    #[error("Failed building package '{name}' ({}): {source}", .definition.display())]
    Task {
        /// Package being built.
        name: PackageName,
        /// Its build definition.
        definition: PathBuf,
        /// What went wrong.
        #[source]
        source: TaskError,
    },

    /// The index could not be aggregated or written.
    #[error("Failed writing package index: {0}")]
    Index(#[from] IndexError),

    /// `Pipeline::run` was called on a pipeline that is not idle.
    #[error("Pipeline has already run")]
    AlreadyRun,

    /// Completed tasks were requested from a pipeline that did not complete.
    #[error("Pipeline did not complete")]
    Incomplete,

    /// Filesystem or runtime failure outside a single package.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: &'static str,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}
