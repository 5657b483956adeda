//! Streaming installer downloads.
//!
//! The body is written to `<dest>.part` and hashed as it arrives. Only a
//! complete, flushed body is renamed onto `dest`, so the cache never holds a
//! partial installer.

use std::io::Write;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use iod_schema::PackageName;

use crate::Reporter;

/// Errors from fetching an installer.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Connection or transfer failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with anything but `200 OK`.
    #[error("Server returned {status} for {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status received.
        status: StatusCode,
    },

    /// The destination could not be written or renamed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn part_path(dest: &Path) -> PathBuf {
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    PathBuf::from(part)
}

/// Download `url` to `dest`, returning the SHA-256 of the body as hex.
///
/// Anything other than `200 OK` is a failure. On any failure the partial
/// file is removed and `dest` is left untouched.
///
/// # Errors
///
/// Returns [`DownloadError`] on transport failure, a non-200 status, or a
/// local write error.
pub async fn download_to_file(
    client: &Client,
    url: &str,
    dest: &Path,
    name: &PackageName,
    reporter: &dyn Reporter,
) -> Result<String, DownloadError> {
    let part = part_path(dest);
    reporter.download_started(name, url);

    match stream_to(client, url, &part, name, reporter).await {
        Ok(digest) => {
            tokio::fs::rename(&part, dest).await?;
            info!(package = %name, sha256 = %digest, "downloaded {url}");
            Ok(digest)
        }
        Err(e) => {
            tokio::fs::remove_file(&part).await.ok();
            Err(e)
        }
    }
}

async fn stream_to(
    client: &Client,
    url: &str,
    part: &Path,
    name: &PackageName,
    reporter: &dyn Reporter,
) -> Result<String, DownloadError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status,
        });
    }

    let total_size = response.content_length();
    reporter.downloading(name, 0, total_size);

    let mut file = File::create(part).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        reporter.downloading(name, downloaded, total_size);
    }

    file.flush().await?;
    file.sync_all().await?;
    debug!(bytes = downloaded, "download complete");

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullReporter;
    use mockito::Server;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_download_writes_body_and_returns_digest() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/setup.exe")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("pkg-installer");
        let name = PackageName::new("pkg");

        let digest = download_to_file(
            &Client::new(),
            &format!("{}/setup.exe", server.url()),
            &dest,
            &name,
            &NullReporter,
        )
        .await
        .unwrap();

        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"abc");
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_non_200_leaves_no_file() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing.exe")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("pkg-installer");

        let err = download_to_file(
            &Client::new(),
            &format!("{}/missing.exe", server.url()),
            &dest,
            &PackageName::new("pkg"),
            &NullReporter,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }
        ));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_other_success_codes_are_rejected() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/partial.exe")
            .with_status(206)
            .with_body("abc")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("pkg-installer");

        let result = download_to_file(
            &Client::new(),
            &format!("{}/partial.exe", server.url()),
            &dest,
            &PackageName::new("pkg"),
            &NullReporter,
        )
        .await;

        assert!(result.is_err());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_io_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/setup.exe")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("no-such-dir").join("pkg-installer");

        let err = download_to_file(
            &Client::new(),
            &format!("{}/setup.exe", server.url()),
            &dest,
            &PackageName::new("pkg"),
            &NullReporter,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DownloadError::Io(_)));
        assert!(!dest.exists());
    }
}
