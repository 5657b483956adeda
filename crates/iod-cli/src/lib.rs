//! `iod-build` command-line definition.
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]

pub mod reporter;

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use iod_core::config::{DEFAULT_DOWNLOADS_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_SOURCE_DIR};
use iod_core::{BuildConfig, default_key_path, public_key_path_for};

/// Command-line flags for `iod-build`.
#[derive(Parser, Debug)]
#[command(name = "iod-build")]
#[command(version, about = "Build signed install-on-demand packages", long_about = None)]
pub struct Cli {
    /// Rebuild packages even if up to date (every package is always rebuilt)
    #[arg(long)]
    pub force: bool,

    /// Directory containing the package sources
    #[arg(long, default_value = DEFAULT_SOURCE_DIR)]
    pub source: PathBuf,

    /// Where package files and the index are written
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Installer download cache
    #[arg(long, default_value = DEFAULT_DOWNLOADS_DIR)]
    pub downloads: PathBuf,

    /// Packages to build: names, paths, or a package-list file (repeatable, comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub packages: Vec<String>,

    /// Private key file [default: ~/.gpii/iod-package-key]
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Public key file [default: <key>.pub]
    #[arg(long)]
    pub pubkey: Option<PathBuf>,

    /// Generate a new key pair instead of building
    #[arg(long)]
    pub keygen: bool,

    /// Key passphrase, `env:NAME`, or `file:PATH`
    #[arg(long, env = "IOD_KEYPASS", hide_env_values = true)]
    pub keypass: Option<String>,

    /// Build every package found under --source
    #[arg(long)]
    pub all: bool,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// The run configuration described by these flags. Paths are still
    /// relative; see [`BuildConfig::absolutize`].
    pub fn to_config(&self) -> BuildConfig {
        let key_path = self.key.clone().unwrap_or_else(default_key_path);
        let public_key_path = self
            .pubkey
            .clone()
            .unwrap_or_else(|| public_key_path_for(&key_path));

        BuildConfig {
            force: self.force,
            source_dir: self.source.clone(),
            output_dir: self.output.clone(),
            downloads_dir: self.downloads.clone(),
            packages: self.packages.clone(),
            all: self.all,
            key_path,
            public_key_path,
            keypass: self.keypass.clone(),
        }
    }

    /// Default log filter for the verbosity level. `RUST_LOG` overrides it.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
