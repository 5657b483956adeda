//! IO modules - side effects (network, filesystem)

pub mod download;
pub mod installer;

pub use download::{DownloadError, download_to_file};
pub use installer::InstallerAcquirer;
