//! Console output for build runs.

use std::path::Path;

use iod_core::Reporter;
use iod_schema::PackageName;

/// Prints build progress for the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    /// A reporter writing to stdout and stderr.
    pub fn new() -> Self {
        Self
    }
}

/// Format a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;

    let value = bytes as f64;
    if value >= MIB {
        format!("{:.1} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        println!("\n  {title}");
    }

    fn building(&self, name: &PackageName, position: usize, total: usize) {
        println!("  [{position}/{total}] {name}");
    }

    fn download_started(&self, _name: &PackageName, url: &str) {
        println!("      fetching {url}");
    }

    fn downloading(&self, _name: &PackageName, current: u64, total: Option<u64>) {
        if current > 0 && total == Some(current) {
            println!("      fetched {}", format_size(current));
        }
    }

    fn cached(&self, _name: &PackageName, path: &Path) {
        println!("      using cached installer {}", path.display());
    }

    fn built(&self, _name: &PackageName, archive: &Path) {
        println!("      wrote {}", archive.display());
    }

    fn failed(&self, name: &PackageName, reason: &str) {
        eprintln!("  error: {name}: {reason}");
    }

    fn info(&self, msg: &str) {
        println!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("  warning: {msg}");
    }

    fn summary(&self, count: usize, elapsed_secs: f64) {
        println!("\n  built {count} package(s) in {elapsed_secs:.1}s");
    }
}
