//! Run configuration.
//!
//! Built once at startup from command-line flags and passed by reference to
//! every component. Nothing in the library reads ambient settings.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::keys::KeyFiles;
use crate::manifest::{PACKAGE_LIST_FILE, Selector};
use crate::paths::{absolute, correct_json_file, default_key_path, find_file, public_key_path_for};

/// Default package source directory.
pub const DEFAULT_SOURCE_DIR: &str = "./packageSource";
/// Default archive and index output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "./output";
/// Default installer download cache.
pub const DEFAULT_DOWNLOADS_DIR: &str = "./download-cache";

/// Immutable settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Rebuild packages even if they are up to date. Every package is
    /// rebuilt on every run, so this is currently informational.
    pub force: bool,
    /// Root for package names, discovery, and the package-list fallback.
    pub source_dir: PathBuf,
    /// Where archives and the index are written.
    pub output_dir: PathBuf,
    /// Installer download cache.
    pub downloads_dir: PathBuf,
    /// Package names, paths, or a single package-list file.
    pub packages: Vec<String>,
    /// Build every package found under `source_dir`.
    pub all: bool,
    /// Private key file.
    pub key_path: PathBuf,
    /// Public key file.
    pub public_key_path: PathBuf,
    /// Passphrase, or an `env:NAME` / `file:PATH` indirection.
    pub keypass: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let key_path = default_key_path();
        Self {
            force: false,
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            packages: Vec::new(),
            all: false,
            public_key_path: public_key_path_for(&key_path),
            key_path,
            keypass: None,
        }
    }
}

impl BuildConfig {
    /// Resolve every path against the current working directory.
    #[must_use]
    pub fn absolutize(self) -> Self {
        Self {
            source_dir: absolute(&self.source_dir),
            output_dir: absolute(&self.output_dir),
            downloads_dir: absolute(&self.downloads_dir),
            key_path: absolute(&self.key_path),
            public_key_path: absolute(&self.public_key_path),
            ..self
        }
    }

    /// The configured key file locations.
    pub fn key_files(&self) -> KeyFiles {
        KeyFiles {
            private: self.key_path.clone(),
            public: self.public_key_path.clone(),
        }
    }

    /// Package entries, with comma-separated values split apart.
    pub fn package_entries(&self) -> Vec<String> {
        self.packages
            .iter()
            .flat_map(|p| p.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Decide how packages are selected for this run.
    ///
    /// `--all` wins. A single entry naming an existing `.json`/`.json5` file
    /// is a package list. Other entries are explicit names or paths. With
    /// nothing given, `<source>/package-list.json5` is used if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPackages`] if nothing selects any package.
    pub fn selector(&self) -> Result<Selector, ConfigError> {
        if self.all {
            return Ok(Selector::Discover);
        }

        let entries = self.package_entries();
        let list = match entries.as_slice() {
            [single] => package_list_file(Path::new(single)),
            _ => None,
        };
        if let Some(list) = list {
            return Ok(Selector::PackageList(absolute(&list)));
        }
        if !entries.is_empty() {
            return Ok(Selector::Explicit(entries));
        }

        let fallback = self.source_dir.join(PACKAGE_LIST_FILE);
        find_file([fallback.with_extension("json5"), fallback.with_extension("json")])
            .map(Selector::PackageList)
            .ok_or(ConfigError::NoPackages)
    }
}

fn package_list_file(path: &Path) -> Option<PathBuf> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext == "json" || ext == "json5");
    if !is_json {
        return None;
    }
    let path = correct_json_file(path);
    path.is_file().then_some(path)
}
