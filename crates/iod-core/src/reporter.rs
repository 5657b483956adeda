//! Reporter trait for dependency injection
//!
//! Lets the build pipeline report progress without being coupled to a
//! particular console or log format.

use std::path::Path;

use iod_schema::PackageName;

/// Receives progress events from a build run.
pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "building", "indexing").
    fn section(&self, title: &str);

    /// A package build is starting. `position` is 1-based.
    fn building(&self, name: &PackageName, position: usize, total: usize);

    /// An installer download is starting.
    fn download_started(&self, name: &PackageName, url: &str);

    /// Updates the progress of a download.
    fn downloading(&self, name: &PackageName, current: u64, total: Option<u64>);

    /// A previously downloaded installer is being reused.
    fn cached(&self, name: &PackageName, path: &Path);

    /// A package archive was written.
    fn built(&self, name: &PackageName, archive: &Path);

    /// A package build failed with a specific reason.
    fn failed(&self, name: &PackageName, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Display a final summary of the run.
    fn summary(&self, count: usize, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn building(&self, name: &PackageName, position: usize, total: usize) {
        (**self).building(name, position, total);
    }
    fn download_started(&self, name: &PackageName, url: &str) {
        (**self).download_started(name, url);
    }
    fn downloading(&self, name: &PackageName, current: u64, total: Option<u64>) {
        (**self).downloading(name, current, total);
    }
    fn cached(&self, name: &PackageName, path: &Path) {
        (**self).cached(name, path);
    }
    fn built(&self, name: &PackageName, archive: &Path) {
        (**self).built(name, archive);
    }
    fn failed(&self, name: &PackageName, reason: &str) {
        (**self).failed(name, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn summary(&self, count: usize, elapsed_secs: f64) {
        (**self).summary(count, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn building(&self, _: &PackageName, _: usize, _: usize) {}
    fn download_started(&self, _: &PackageName, _: &str) {}
    fn downloading(&self, _: &PackageName, _: u64, _: Option<u64>) {}
    fn cached(&self, _: &PackageName, _: &Path) {}
    fn built(&self, _: &PackageName, _: &Path) {}
    fn failed(&self, _: &PackageName, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: f64) {}
}
