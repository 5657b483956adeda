//! One package to build.

use std::path::{Path, PathBuf};

use iod_schema::{InstallerRef, PackageData, PackageName};

use crate::paths::archive_output_path;

/// A resolved package build: where it came from, what goes in it, and where
/// the archive will be written.
#[derive(Debug, Clone)]
pub struct BuildTask {
    /// Package name, taken from the package data.
    pub name: PackageName,
    /// Directory holding the build definition.
    pub source_dir: PathBuf,
    /// The build definition file this task came from.
    pub definition_path: PathBuf,
    /// The package data embedded in the archive.
    pub package_data: PackageData,
    /// Declared installer source, if any.
    pub installer: Option<InstallerRef>,
    /// Output sub-directory.
    pub category: Option<String>,
    /// Archive destination.
    pub output_path: PathBuf,
    /// Local installer file, set once acquired.
    pub resolved_installer: Option<PathBuf>,
    /// Archive written for this task, set once built.
    pub produced_archive: Option<PathBuf>,
}

impl BuildTask {
    /// Create a task. The output path is derived from `output_dir`,
    /// `category` and the package name.
    pub fn new(
        definition_path: PathBuf,
        package_data: PackageData,
        installer: Option<InstallerRef>,
        category: Option<String>,
        output_dir: &Path,
    ) -> Self {
        let name = package_data.name().clone();
        let source_dir = definition_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let output_path = archive_output_path(output_dir, category.as_deref(), name.as_str());

        Self {
            name,
            source_dir,
            definition_path,
            package_data,
            installer,
            category,
            output_path,
            resolved_installer: None,
            produced_archive: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_paths() {
        let data = PackageData::from_value(json!({ "name": "nvda" })).unwrap();
        let task = BuildTask::new(
            PathBuf::from("/src/nvda/build.json5"),
            data,
            Some(InstallerRef::parse("nvda.exe")),
            Some("readers".to_string()),
            Path::new("/out"),
        );

        assert_eq!(task.name, "nvda");
        assert_eq!(task.source_dir, PathBuf::from("/src/nvda"));
        assert_eq!(
            task.output_path,
            PathBuf::from("/out/readers/nvda.morphic-package")
        );
        assert!(task.resolved_installer.is_none());
        assert!(task.produced_archive.is_none());
    }
}
