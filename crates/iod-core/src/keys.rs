//! Signing key lifecycle.
//!
//! A build run needs an RSA key pair: the private key signs each package's
//! data, the public key is what install-on-demand clients trust. Keys are
//! either generated once (`--keygen`) or loaded from two existing files.
//!
//! ## File formats
//!
//! - Private key: PKCS#1 PEM, encrypted with AES-128-CBC under the
//!   passphrase. Written with mode `0600`.
//! - Public key: SPKI PEM, preceded by a `Fingerprint=sha256:<base64>` line
//!   and a blank line.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use thiserror::Error;
use tracing::{debug, info};

use iod_schema::Fingerprint;

use crate::archive::{ArchiveError, read_pem};
use crate::error::ConfigError;
use crate::paths::absolute;

/// RSA modulus size for generated keys.
pub const KEY_BITS: u32 = 4096;

/// Errors raised while loading or generating keys.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Missing keys, existing keys or a bad passphrase source.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// RSA generation or PEM encoding failed.
    #[error("Key generation failed: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    /// The generated public key could not be decoded for fingerprinting.
    #[error("Invalid public key: {0}")]
    Pem(#[from] ArchiveError),

    /// A key file could not be read or written.
    #[error("Unable to access key file '{}': {source}", .path.display())]
    Io {
        /// The key file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}

/// Locations of the two key files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFiles {
    /// Private key file.
    pub private: PathBuf,
    /// Public key file.
    pub public: PathBuf,
}

/// Which of the two key files exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyPresence {
    /// The private key file exists.
    pub private: bool,
    /// The public key file exists.
    pub public: bool,
}

impl KeyPresence {
    /// At least one key file exists.
    pub fn any(self) -> bool {
        self.private || self.public
    }

    /// Both key files exist.
    pub fn both(self) -> bool {
        self.private && self.public
    }
}

/// Key material for one run, held in memory as opaque bytes.
///
/// Nothing here checks that the passphrase actually opens the private key;
/// a wrong passphrase surfaces when the first archive is signed.
#[derive(Clone)]
pub struct KeyPair {
    private_key: Vec<u8>,
    public_key: Vec<u8>,
    passphrase: String,
}

impl KeyPair {
    /// Assemble a key pair from raw PEM bytes.
    pub fn new(private_key: Vec<u8>, public_key: Vec<u8>, passphrase: impl Into<String>) -> Self {
        Self {
            private_key,
            public_key,
            passphrase: passphrase.into(),
        }
    }

    /// Private key PEM (possibly encrypted).
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Public key PEM, possibly preceded by comment lines.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Passphrase for the private key. May be empty.
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &format_args!("<{} bytes>", self.private_key.len()))
            .field("public_key", &format_args!("<{} bytes>", self.public_key.len()))
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Where the key passphrase comes from.
///
/// Parsed from the `--keypass` value:
///
/// ```
/// use iod_core::keys::PassphraseSource;
///
/// assert_eq!(PassphraseSource::parse("env:KEY_PASS"), PassphraseSource::Env("KEY_PASS".into()));
/// assert_eq!(PassphraseSource::parse("hunter2"), PassphraseSource::Literal("hunter2".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassphraseSource {
    /// The value itself.
    Literal(String),
    /// `env:NAME`: the value of environment variable `NAME`.
    Env(String),
    /// `file:PATH`: the first line of a file.
    File(PathBuf),
}

impl PassphraseSource {
    /// Interpret a raw `--keypass` value.
    pub fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix("env:") {
            Self::Env(name.to_string())
        } else if let Some(path) = raw.strip_prefix("file:") {
            Self::File(PathBuf::from(path))
        } else {
            Self::Literal(raw.to_string())
        }
    }

    /// Resolve against the process environment. The result may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PassphraseFile`] if a passphrase file cannot be read.
    pub fn resolve(&self) -> Result<String, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup. An unset variable
    /// resolves to an empty passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PassphraseFile`] if a passphrase file cannot be read.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Env(name) => {
                info!("Using environment variable '{name}' for key passphrase");
                Ok(lookup(name).unwrap_or_default())
            }
            Self::File(path) => {
                let path = absolute(path);
                info!("Using file '{}' for key passphrase", path.display());
                let content = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::PassphraseFile { path, source })?;
                Ok(content.lines().next().unwrap_or_default().to_string())
            }
        }
    }
}

/// Result of generating a new key pair.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// Fingerprint of the public key, for the site configuration.
    pub fingerprint: Fingerprint,
    /// Where the private key was written.
    pub private_path: PathBuf,
    /// Where the public key was written.
    pub public_path: PathBuf,
}

/// Checks for, loads, and generates the signing key pair.
#[derive(Debug, Clone)]
pub struct KeyManager {
    files: KeyFiles,
    bits: u32,
}

impl KeyManager {
    /// Create a manager for the given key file locations.
    pub fn new(files: KeyFiles) -> Self {
        Self {
            files,
            bits: KEY_BITS,
        }
    }

    /// Override the RSA modulus size (used by tests to keep generation fast).
    #[must_use]
    pub fn with_bits(mut self, bits: u32) -> Self {
        self.bits = bits;
        self
    }

    /// The key file locations.
    pub fn files(&self) -> &KeyFiles {
        &self.files
    }

    /// Report which key files exist.
    pub fn check(&self) -> KeyPresence {
        KeyPresence {
            private: self.files.private.exists(),
            public: self.files.public.exists(),
        }
    }

    /// Fail unless both key files exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKeys`] naming both paths.
    pub fn ensure_key_pair_exists(&self) -> Result<(), ConfigError> {
        if self.check().both() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys {
                private: self.files.private.clone(),
                public: self.files.public.clone(),
            })
        }
    }

    /// Load both key files and attach the passphrase.
    ///
    /// `env:` and `file:` indirections are resolved; an empty passphrase is
    /// allowed here (the key might not be encrypted).
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or unreadable, or the
    /// passphrase file cannot be read.
    pub fn load(&self, keypass: Option<&str>) -> Result<KeyPair, KeyError> {
        self.ensure_key_pair_exists()?;

        let private_key = read_key_file(&self.files.private)?;
        let public_key = read_key_file(&self.files.public)?;
        let passphrase = match keypass {
            Some(raw) => PassphraseSource::parse(raw).resolve()?,
            None => String::new(),
        };

        debug!(
            private = %self.files.private.display(),
            public = %self.files.public.display(),
            "loaded key pair"
        );
        Ok(KeyPair::new(private_key, public_key, passphrase))
    }

    /// Generate and save a new key pair.
    ///
    /// Refuses to run if either key file already exists, and refuses an
    /// empty passphrase: a generated key is always encrypted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KeysExist`], [`ConfigError::MissingPassphrase`],
    /// or an error from key generation or writing the files.
    pub fn generate(&self, source: &PassphraseSource) -> Result<GeneratedKey, KeyError> {
        self.generate_with(source, |name| std::env::var(name).ok())
    }

    /// [`generate`](Self::generate) with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// See [`generate`](Self::generate).
    pub fn generate_with<F>(
        &self,
        source: &PassphraseSource,
        lookup: F,
    ) -> Result<GeneratedKey, KeyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let presence = self.check();
        if presence.any() {
            let path = if presence.private {
                self.files.private.clone()
            } else {
                self.files.public.clone()
            };
            return Err(ConfigError::KeysExist { path }.into());
        }

        let passphrase = source.resolve_with(lookup)?;
        if passphrase.is_empty() {
            return Err(ConfigError::MissingPassphrase.into());
        }

        info!(bits = self.bits, "generating key pair");
        let rsa = Rsa::generate(self.bits)?;
        let private_pem =
            rsa.private_key_to_pem_passphrase(Cipher::aes_128_cbc(), passphrase.as_bytes())?;
        let public_pem = PKey::from_rsa(rsa)?.public_key_to_pem()?;

        let fingerprint = Fingerprint::compute(&read_pem(&public_pem)?);
        let mut public_file = format!("{}\n\n", fingerprint.comment_line()).into_bytes();
        public_file.extend_from_slice(&public_pem);

        for path in [&self.files.private, &self.files.public] {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).map_err(|source| KeyError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        info!("writing private key to {}", self.files.private.display());
        write_private_key(&self.files.private, &private_pem)?;
        info!("writing public key to {}", self.files.public.display());
        fs::write(&self.files.public, &public_file).map_err(|source| KeyError::Io {
            path: self.files.public.clone(),
            source,
        })?;

        Ok(GeneratedKey {
            fingerprint,
            private_path: self.files.private.clone(),
            public_path: self.files.public.clone(),
        })
    }
}

/// Compute the fingerprint of a public key file's contents.
///
/// # Errors
///
/// Returns an error if the text contains no PEM block.
pub fn fingerprint_of(public_key: &[u8]) -> Result<Fingerprint, KeyError> {
    Ok(Fingerprint::compute(&read_pem(public_key)?))
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, KeyError> {
    fs::read(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_private_key(path: &Path, pem: &[u8]) -> Result<(), KeyError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let to_err = |source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = options.open(path).map_err(to_err)?;
    file.write_all(pem).map_err(to_err)?;
    file.sync_all().map_err(to_err)?;
    Ok(())
}
