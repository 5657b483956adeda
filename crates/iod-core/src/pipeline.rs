//! Sequential, fail-fast build pipeline.
//!
//! Each task is built completely (installer acquired, archive written and
//! read back) before the next one starts. The first failure aborts the run;
//! archives already written stay on disk.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::archive::PackageArchive;
use crate::error::{BuildError, TaskError};
use crate::io::InstallerAcquirer;
use crate::keys::KeyPair;
use crate::reporter::Reporter;
use crate::task::BuildTask;

/// Where a pipeline is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Building.
    Running,
    /// Every task produced an archive.
    Completed,
    /// A task failed.
    Aborted,
}

/// Builds a list of tasks, one after another.
pub struct Pipeline {
    tasks: Vec<BuildTask>,
    key_pair: KeyPair,
    acquirer: InstallerAcquirer,
    archive: Arc<dyn PackageArchive>,
    reporter: Arc<dyn Reporter>,
    state: PipelineState,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("tasks", &self.tasks.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// A pipeline over `tasks`, in the order given.
    pub fn new(
        tasks: Vec<BuildTask>,
        key_pair: KeyPair,
        acquirer: InstallerAcquirer,
        archive: Arc<dyn PackageArchive>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            tasks,
            key_pair,
            acquirer,
            archive,
            reporter,
            state: PipelineState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The tasks, with whatever results have been recorded so far.
    pub fn tasks(&self) -> &[BuildTask] {
        &self.tasks
    }

    /// Build every task in order.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::AlreadyRun`] if the pipeline is not idle, or
    /// [`BuildError::Task`] for the first task that fails.
    pub async fn run(&mut self) -> Result<(), BuildError> {
        if self.state != PipelineState::Idle {
            return Err(BuildError::AlreadyRun);
        }
        self.state = PipelineState::Running;

        let Self {
            tasks,
            key_pair,
            acquirer,
            archive,
            reporter,
            state,
        } = self;

        let total = tasks.len();
        for (i, task) in tasks.iter_mut().enumerate() {
            reporter.building(&task.name, i + 1, total);

            if let Err(source) =
                build_one(task, key_pair, acquirer, archive.as_ref(), reporter.as_ref()).await
            {
                error!(package = %task.name, "build failed: {source}");
                reporter.failed(&task.name, &source.to_string());
                *state = PipelineState::Aborted;
                return Err(BuildError::Task {
                    name: task.name.clone(),
                    definition: task.definition_path.clone(),
                    source,
                });
            }
        }

        *state = PipelineState::Completed;
        info!("built {total} packages");
        Ok(())
    }

    /// The built tasks, once every one of them has an archive.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Incomplete`] unless the run completed.
    pub fn into_completed(self) -> Result<Vec<BuildTask>, BuildError> {
        if self.state == PipelineState::Completed {
            Ok(self.tasks)
        } else {
            Err(BuildError::Incomplete)
        }
    }
}

async fn build_one(
    task: &mut BuildTask,
    key_pair: &KeyPair,
    acquirer: &InstallerAcquirer,
    archive: &dyn PackageArchive,
    reporter: &dyn Reporter,
) -> Result<(), TaskError> {
    task.resolved_installer = acquirer.resolve(task, reporter).await?;

    if let Some(parent) = task.output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let written = archive
        .create(
            &task.package_data,
            task.resolved_installer.as_deref(),
            key_pair,
            &task.output_path,
        )
        .await?;

    let info = archive.read(&written).await?;
    if info.package_data.name() != &task.name {
        return Err(TaskError::NameMismatch {
            path: written,
            expected: task.name.clone(),
            actual: info.package_data.name().clone(),
        });
    }

    debug!(package = %task.name, archive = %written.display(), "archive verified");
    reporter.built(&task.name, &written);
    task.produced_archive = Some(written);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::NullReporter;
    use crate::archive::{ArchiveError, ArchiveHeader, ArchiveInfo};
    use async_trait::async_trait;
    use iod_schema::PackageData;
    use serde_json::json;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Writes the package-data JSON as the whole archive and fails on a
    /// chosen call.
    #[derive(Default)]
    pub(crate) struct FakeArchive {
        pub fail_on: Option<usize>,
        pub calls: Mutex<usize>,
    }

    #[async_trait]
    impl PackageArchive for FakeArchive {
        async fn create(
            &self,
            package_data: &PackageData,
            installer: Option<&Path>,
            _key_pair: &KeyPair,
            output: &Path,
        ) -> Result<PathBuf, ArchiveError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            if self.fail_on == Some(call) {
                return Err(ArchiveError::malformed(output, "refusing to write"));
            }
            if let Some(installer) = installer {
                std::fs::metadata(installer)?;
            }
            std::fs::write(output, package_data.to_json()?)?;
            Ok(output.to_path_buf())
        }

        async fn read(&self, archive: &Path) -> Result<ArchiveInfo, ArchiveError> {
            let json = std::fs::read_to_string(archive)?;
            let package_data = PackageData::parse_json(&json)?;
            Ok(ArchiveInfo {
                header: ArchiveHeader {
                    version: 1,
                    package_data_length: json.len() as u64,
                    signature_length: 3,
                    installer_length: None,
                    installer_offset: None,
                },
                package_data_json: json,
                package_data,
                signature: b"sig".to_vec(),
                path: archive.to_path_buf(),
            })
        }
    }

    pub(crate) fn tasks(names: &[&str], output: &Path) -> Vec<BuildTask> {
        names
            .iter()
            .map(|name| {
                BuildTask::new(
                    PathBuf::from(format!("/src/{name}/build.json")),
                    PackageData::from_value(json!({ "name": name })).unwrap(),
                    None,
                    None,
                    output,
                )
            })
            .collect()
    }

    pub(crate) fn key_pair() -> KeyPair {
        KeyPair::new(b"private".to_vec(), b"public".to_vec(), "")
    }

    fn pipeline(tasks: Vec<BuildTask>, archive: Arc<FakeArchive>, downloads: &Path) -> Pipeline {
        Pipeline::new(
            tasks,
            key_pair(),
            InstallerAcquirer::new(downloads).unwrap(),
            archive,
            Arc::new(NullReporter),
        )
    }

    #[tokio::test]
    async fn test_all_tasks_complete() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut pipeline = pipeline(
            tasks(&["a", "b", "c"], &out),
            Arc::new(FakeArchive::default()),
            dir.path(),
        );

        assert_eq!(pipeline.state(), PipelineState::Idle);
        pipeline.run().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Completed);

        let done = pipeline.into_completed().unwrap();
        assert_eq!(done.len(), 3);
        for task in &done {
            let archive = task.produced_archive.as_ref().unwrap();
            assert_eq!(archive, &task.output_path);
            assert!(archive.exists());
        }
    }

    #[tokio::test]
    async fn test_failure_aborts_and_keeps_earlier_archives() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let archive = Arc::new(FakeArchive {
            fail_on: Some(3),
            ..FakeArchive::default()
        });
        let mut pipeline = pipeline(
            tasks(&["a", "b", "c", "d", "e"], &out),
            archive.clone(),
            dir.path(),
        );

        let err = pipeline.run().await.unwrap_err();
        match &err {
            BuildError::Task {
                name, definition, ..
            } => {
                assert_eq!(name, "c");
                assert_eq!(definition, &PathBuf::from("/src/c/build.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pipeline.state(), PipelineState::Aborted);
        assert_eq!(*archive.calls.lock().unwrap(), 3);

        assert!(out.join("a.morphic-package").exists());
        assert!(out.join("b.morphic-package").exists());
        assert!(!out.join("c.morphic-package").exists());
        assert!(!out.join("d.morphic-package").exists());

        assert!(matches!(
            pipeline.into_completed(),
            Err(BuildError::Incomplete)
        ));
    }

    #[tokio::test]
    async fn test_missing_local_installer_fails_task() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut list = tasks(&["a"], &out);
        list[0].installer = Some(iod_schema::InstallerRef::parse("missing.exe"));

        let mut pipeline = pipeline(list, Arc::new(FakeArchive::default()), dir.path());
        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Task {
                source: TaskError::Archive(ArchiveError::Io(_)),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_pipeline_runs_once() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = pipeline(
            tasks(&["a"], &dir.path().join("out")),
            Arc::new(FakeArchive::default()),
            dir.path(),
        );
        pipeline.run().await.unwrap();
        assert!(matches!(pipeline.run().await, Err(BuildError::AlreadyRun)));
    }

    #[tokio::test]
    async fn test_categories_create_directories() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let task = BuildTask::new(
            PathBuf::from("/src/a/build.json"),
            PackageData::from_value(json!({ "name": "a" })).unwrap(),
            None,
            Some("tools".to_string()),
            &out,
        );

        let mut pipeline = pipeline(vec![task], Arc::new(FakeArchive::default()), dir.path());
        pipeline.run().await.unwrap();
        assert!(out.join("tools").join("a.morphic-package").exists());
    }
}
