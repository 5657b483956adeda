//! Top-level operations: build every selected package, or generate keys.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use iod_schema::LocalIndex;

use crate::archive::PackageArchive;
use crate::config::BuildConfig;
use crate::error::{BuildError, ConfigError};
use crate::index::{IndexAggregator, write_index};
use crate::io::InstallerAcquirer;
use crate::keys::{GeneratedKey, KeyError, KeyManager, PassphraseSource};
use crate::manifest::{ManifestResolver, duplicate_names};
use crate::pipeline::Pipeline;
use crate::reporter::Reporter;
use crate::task::BuildTask;

/// What a successful build run produced.
#[derive(Debug)]
pub struct BuildReport {
    /// Every task, each with its archive.
    pub tasks: Vec<BuildTask>,
    /// The index that was written.
    pub index: LocalIndex,
    /// Where the index was written.
    pub index_path: PathBuf,
}

/// Build every selected package and write the local index.
///
/// Keys are checked before anything else, so a missing key fails the run
/// without touching the source or output directories.
///
/// # Errors
///
/// Returns the first configuration, resolution, build or index error.
#[instrument(skip_all, fields(source = %config.source_dir.display()))]
pub async fn run_build(
    config: &BuildConfig,
    archive: Arc<dyn PackageArchive>,
    reporter: Arc<dyn Reporter>,
) -> Result<BuildReport, BuildError> {
    let start = Instant::now();

    let keys = KeyManager::new(config.key_files());
    keys.ensure_key_pair_exists()?;
    let key_pair = keys
        .load(config.keypass.as_deref())
        .map_err(flatten_key_error)?;

    if config.force {
        info!("--force given; every package is rebuilt on each run");
    }

    let selector = config.selector()?;
    reporter.section("resolving");
    let tasks = ManifestResolver::from_config(config).resolve(&selector)?;
    if tasks.is_empty() {
        return Err(ConfigError::NoPackages.into());
    }
    reporter.info(&format!("Found {} packages to build", tasks.len()));
    for name in duplicate_names(&tasks) {
        reporter.warning(&format!(
            "Package '{name}' is defined more than once; the last definition wins"
        ));
    }

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| BuildError::io("Unable to create output directory", e))?;

    let acquirer = InstallerAcquirer::new(&config.downloads_dir)
        .map_err(|e| BuildError::io("Unable to create HTTP client", std::io::Error::other(e)))?;

    reporter.section("building");
    let mut pipeline = Pipeline::new(tasks, key_pair, acquirer, archive.clone(), reporter.clone());
    pipeline.run().await?;
    let tasks = pipeline.into_completed()?;

    reporter.section("indexing");
    let index = IndexAggregator::new(archive.as_ref(), &config.output_dir)
        .aggregate(&tasks)
        .await?;
    let index_path = write_index(&index, &config.output_dir).await?;

    reporter.summary(tasks.len(), start.elapsed().as_secs_f64());
    Ok(BuildReport {
        tasks,
        index,
        index_path,
    })
}

/// Generate a new key pair at the configured locations.
///
/// # Errors
///
/// Fails if either key file exists, the passphrase is missing or empty, or
/// the key cannot be generated or written.
pub async fn run_keygen(config: &BuildConfig) -> Result<GeneratedKey, BuildError> {
    let keys = KeyManager::new(config.key_files());
    generate(keys, config.keypass.as_deref()).await
}

pub(crate) async fn generate(
    keys: KeyManager,
    keypass: Option<&str>,
) -> Result<GeneratedKey, BuildError> {
    let source = PassphraseSource::parse(keypass.ok_or(ConfigError::MissingPassphrase)?);

    // RSA generation is CPU-bound.
    let generated = tokio::task::spawn_blocking(move || keys.generate(&source))
        .await
        .map_err(|e| BuildError::io("Key generation task failed", std::io::Error::other(e)))?
        .map_err(flatten_key_error)?;

    info!(fingerprint = %generated.fingerprint, "generated key pair");
    Ok(generated)
}

/// Surface configuration problems found while handling keys as
/// configuration errors.
fn flatten_key_error(e: KeyError) -> BuildError {
    match e {
        KeyError::Config(e) => BuildError::Config(e),
        other => BuildError::Key(other),
    }
}
