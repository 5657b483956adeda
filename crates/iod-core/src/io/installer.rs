//! Installer acquisition.
//!
//! Remote installers are fetched once into the downloads cache and reused on
//! later runs. Local installers are used in place.

use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::debug;

use iod_schema::InstallerRef;

use super::download::{DownloadError, download_to_file};
use crate::Reporter;
use crate::paths::installer_cache_path;
use crate::task::BuildTask;

/// Turns a task's declared installer into a local file.
#[derive(Debug, Clone)]
pub struct InstallerAcquirer {
    client: Client,
    downloads_dir: PathBuf,
}

impl InstallerAcquirer {
    /// Create an acquirer caching downloads under `downloads_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let client = Client::builder().user_agent(crate::USER_AGENT).build()?;
        Ok(Self::with_client(client, downloads_dir))
    }

    /// Create an acquirer with a caller-supplied client.
    pub fn with_client(client: Client, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            downloads_dir: downloads_dir.into(),
        }
    }

    /// The downloads cache directory.
    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Cache location for a package's installer.
    pub fn cache_path(&self, name: &str) -> PathBuf {
        installer_cache_path(&self.downloads_dir, name)
    }

    /// Resolve the task's installer to a local path.
    ///
    /// A URL is served from the cache when present, otherwise downloaded
    /// into it. A local path is joined to the task's source directory and
    /// not checked here; a missing file fails when the archive is created.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] if a download fails.
    pub async fn resolve(
        &self,
        task: &BuildTask,
        reporter: &dyn Reporter,
    ) -> Result<Option<PathBuf>, DownloadError> {
        match &task.installer {
            None => Ok(None),
            Some(InstallerRef::Path(path)) => Ok(Some(task.source_dir.join(path))),
            Some(InstallerRef::Url(url)) => {
                let cache = self.cache_path(task.name.as_str());
                if tokio::fs::try_exists(&cache).await? {
                    debug!(package = %task.name, "using cached installer");
                    reporter.cached(&task.name, &cache);
                    return Ok(Some(cache));
                }

                tokio::fs::create_dir_all(&self.downloads_dir).await?;
                download_to_file(&self.client, url, &cache, &task.name, reporter).await?;
                Ok(Some(cache))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use iod_schema::PackageData;
    use mockito::Server;
    use serde_json::json;
    use tempfile::TempDir;

    fn task(installer: Option<&str>) -> BuildTask {
        let data = PackageData::from_value(json!({ "name": "reader" })).unwrap();
        BuildTask::new(
            PathBuf::from("/src/reader/build.json"),
            data,
            installer.map(InstallerRef::parse),
            None,
            Path::new("/out"),
        )
    }

    #[tokio::test]
    async fn test_local_installer_is_relative_to_source() {
        let dir = TempDir::new().unwrap();
        let acquirer = InstallerAcquirer::new(dir.path()).unwrap();

        let resolved = acquirer
            .resolve(&task(Some("setup.msi")), &NullReporter)
            .await
            .unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/src/reader/setup.msi")));
    }

    #[tokio::test]
    async fn test_no_installer() {
        let dir = TempDir::new().unwrap();
        let acquirer = InstallerAcquirer::new(dir.path()).unwrap();

        let resolved = acquirer.resolve(&task(None), &NullReporter).await.unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_download_is_cached() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/reader.exe")
            .with_status(200)
            .with_body("installer bytes")
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let downloads = dir.path().join("download-cache");
        let acquirer = InstallerAcquirer::new(&downloads).unwrap();
        let task = task(Some(&format!("{}/reader.exe", server.url())));

        let first = acquirer.resolve(&task, &NullReporter).await.unwrap();
        let second = acquirer.resolve(&task, &NullReporter).await.unwrap();

        let expected = downloads.join("reader-installer");
        assert_eq!(first, Some(expected.clone()));
        assert_eq!(second, Some(expected.clone()));
        assert_eq!(std::fs::read(&expected).unwrap(), b"installer bytes");
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_download_is_not_cached() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/reader.exe")
            .with_status(500)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let acquirer = InstallerAcquirer::new(dir.path()).unwrap();
        let task = task(Some(&format!("{}/reader.exe", server.url())));

        assert!(acquirer.resolve(&task, &NullReporter).await.is_err());
        assert!(!acquirer.cache_path("reader").exists());
    }
}
