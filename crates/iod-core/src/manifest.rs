//! Build definition discovery and loading.
//!
//! Turns a [`Selector`] into an ordered list of [`BuildTask`]s. Every
//! definition is fully loaded and validated before any build starts, so a
//! broken package fails the run up front.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use iod_schema::{BuildDefinition, PackageData, PackageName};

use crate::config::BuildConfig;
use crate::error::ResolveError;
use crate::paths::{absolute, correct_json_file, looks_like_path};
use crate::task::BuildTask;

/// Build definition file name; `build.json5` is accepted too.
pub const BUILD_FILE: &str = "build.json";

/// Package list looked for in the source directory when nothing is selected.
pub const PACKAGE_LIST_FILE: &str = "package-list.json5";

/// Paths containing this marker are skipped by package lists and discovery.
pub const IGNORE_MARKER: &str = ".ignore";

/// How the packages for a run are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Package names (under the source directory) or paths.
    Explicit(Vec<String>),
    /// A `{ build: [glob, ...] }` document.
    PackageList(PathBuf),
    /// Every package found under the source directory.
    Discover,
}

#[derive(Debug, Deserialize)]
struct PackageList {
    #[serde(default)]
    build: Vec<String>,
}

/// The build definition in `dir`, if there is one.
pub fn find_build_file(dir: &Path) -> Option<PathBuf> {
    let path = correct_json_file(&dir.join(BUILD_FILE));
    path.is_file().then_some(path)
}

/// Names built by more than one task, once each, in first-seen order.
pub fn duplicate_names(tasks: &[BuildTask]) -> Vec<&PackageName> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for task in tasks {
        if !seen.insert(&task.name) && !duplicates.contains(&&task.name) {
            duplicates.push(&task.name);
        }
    }
    duplicates
}

fn is_ignored(path: &Path) -> bool {
    path.to_string_lossy().contains(IGNORE_MARKER)
}

/// Resolves selectors into build tasks.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl ManifestResolver {
    /// Create a resolver rooted at `source_dir`, placing archives under
    /// `output_dir`.
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create a resolver for a run's configuration.
    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(&config.source_dir, &config.output_dir)
    }

    /// Resolve and load every selected package, in selection order.
    ///
    /// Packages sharing a name are all kept; the later one overwrites the
    /// earlier archive and index entry. See [`duplicate_names`].
    ///
    /// # Errors
    ///
    /// Fails on the first definition or package-data file that is missing
    /// or invalid.
    pub fn resolve(&self, selector: &Selector) -> Result<Vec<BuildTask>, ResolveError> {
        let files = self.build_files(selector)?;
        info!("Found {} packages to build", files.len());

        files.iter().map(|file| self.load(file)).collect()
    }

    /// The build definition files a selector refers to.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit entry does not exist, the package
    /// list cannot be read, or the source directory cannot be walked.
    pub fn build_files(&self, selector: &Selector) -> Result<Vec<PathBuf>, ResolveError> {
        match selector {
            Selector::Explicit(entries) => entries.iter().map(|e| self.explicit(e)).collect(),
            Selector::PackageList(list) => package_list(list),
            Selector::Discover => discover(&self.source_dir),
        }
    }

    fn explicit(&self, entry: &str) -> Result<PathBuf, ResolveError> {
        let base = if looks_like_path(entry) {
            absolute(Path::new(entry))
        } else {
            self.source_dir.join(entry)
        };
        definition_at(&base)
    }

    /// Load one build definition and its package data.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or unparseable, or the
    /// package data has no usable `name`.
    pub fn load(&self, definition_path: &Path) -> Result<BuildTask, ResolveError> {
        debug!("Loading {}", definition_path.display());
        let text = read_text(definition_path)?;
        let definition =
            BuildDefinition::parse(&text).map_err(|e| ResolveError::Definition {
                path: definition_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let dir = definition_path.parent().unwrap_or(Path::new("."));
        let data_path = correct_json_file(&dir.join(&definition.package_data));
        let data_text = read_text(&data_path)?;
        let package_data =
            PackageData::parse_relaxed(&data_text).map_err(|source| ResolveError::PackageData {
                path: data_path.clone(),
                source,
            })?;

        let declared = definition.name.as_deref();
        if let Some(declared) = declared.filter(|d| *d != package_data.name().as_str()) {
            debug!(
                declared,
                actual = %package_data.name(),
                "build definition name ignored in favour of package data"
            );
        }

        Ok(BuildTask::new(
            definition_path.to_path_buf(),
            package_data,
            definition.installer_ref(),
            definition.category().map(ToString::to_string),
            &self.output_dir,
        ))
    }
}

fn read_text(path: &Path) -> Result<String, ResolveError> {
    if !path.exists() {
        return Err(ResolveError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|source| ResolveError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// A directory's build definition, or the path itself if it is a file.
fn definition_at(path: &Path) -> Result<PathBuf, ResolveError> {
    if path.is_dir() {
        return find_build_file(path).ok_or_else(|| ResolveError::MissingFile {
            path: path.join(BUILD_FILE),
        });
    }

    let file = correct_json_file(path);
    if file.is_file() {
        Ok(file)
    } else {
        Err(ResolveError::MissingFile {
            path: path.to_path_buf(),
        })
    }
}

/// Expand a package list's globs relative to the list's directory.
fn package_list(list: &Path) -> Result<Vec<PathBuf>, ResolveError> {
    let list = correct_json_file(list);
    let text = read_text(&list)?;
    let parsed: PackageList = json5::from_str(&text).map_err(|e| ResolveError::PackageList {
        path: list.clone(),
        message: e.to_string(),
    })?;

    let base = list
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut files = Vec::new();
    for item in &parsed.build {
        let pattern = base.join(item);
        let pattern_str = pattern.to_string_lossy();
        let entries = glob::glob(&pattern_str).map_err(|e| ResolveError::Glob {
            pattern: item.clone(),
            message: e.to_string(),
        })?;

        let mut matches: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|p| !is_ignored(p))
            .collect();
        matches.sort();
        if matches.is_empty() {
            warn!(pattern = %item, "package list entry matched nothing");
        }

        for found in matches {
            files.push(definition_at(&found)?);
        }
    }
    Ok(files)
}

/// Every directory under `root` holding a build definition.
fn discover(root: &Path) -> Result<Vec<PathBuf>, ResolveError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().contains(IGNORE_MARKER));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(file) = find_build_file(entry.path()) {
            files.push(file);
        }
    }
    Ok(files)
}
