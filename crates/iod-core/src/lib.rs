//! Builder for signed install-on-demand packages.
//!
//! [`run_build`] resolves the selected build definitions, fetches their
//! installers, writes one signed archive per package and then the local
//! index. [`run_keygen`] creates the signing key pair.

pub mod archive;
pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod keys;
pub mod manifest;
pub mod paths;
pub mod pipeline;
pub mod run;
pub mod task;

pub mod reporter;

pub use archive::{PackageArchive, PackageFile};
pub use config::BuildConfig;
pub use error::{BuildError, ConfigError, ResolveError, TaskError};
pub use paths::*;
pub use reporter::{NullReporter, Reporter};
pub use run::{BuildReport, run_build, run_keygen};

/// User Agent string for installer downloads
pub const USER_AGENT: &str = concat!("iod-core/", env!("CARGO_PKG_VERSION"));
