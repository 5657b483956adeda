//! The `.morphic-package` file format.
//!
//! ```text
//! offset 0   magic "MORPHIC\0"            8 bytes
//! offset 8   header length (u32, LE)      4 bytes
//! offset 12  header JSON                  header length
//!            package-data JSON            header.packageDataLength
//!            signature                    header.signatureLength
//!            installer payload            header.installerLength (optional)
//! ```
//!
//! The signature is RSA PKCS#1 v1.5 over SHA-256 of the package-data JSON
//! bytes. `installerOffset` in the header is absolute, so a client can
//! stream the installer straight out of the archive.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::{Signer, Verifier};
use tracing::debug;

use iod_schema::PackageData;

use super::{ArchiveError, ArchiveHeader, ArchiveInfo, PackageArchive, read_pem};
use crate::keys::KeyPair;

/// File magic.
pub const MAGIC: [u8; 8] = *b"MORPHIC\0";

/// Current header version.
pub const FORMAT_VERSION: u32 = 1;

const PREFIX_LEN: u64 = MAGIC.len() as u64 + 4;

/// Upper bound on header size; anything larger is not a package file.
const MAX_HEADER_LEN: u32 = 64 * 1024;

/// The default [`PackageArchive`], writing `.morphic-package` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageFile;

impl PackageFile {
    /// Create the archive writer/reader.
    pub fn new() -> Self {
        Self
    }

    /// Check an archive's signature against a public key.
    ///
    /// `public_key` may carry leading comment lines, as written by the key
    /// generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be decoded.
    pub fn verify(info: &ArchiveInfo, public_key: &[u8]) -> Result<bool, ArchiveError> {
        let der = read_pem(public_key)?;
        let key = PKey::public_key_from_der(&der)?;
        let mut verifier = Verifier::new(MessageDigest::sha256(), &key)?;
        verifier.update(info.package_data_json.as_bytes())?;
        Ok(verifier.verify(&info.signature)?)
    }
}

#[async_trait]
impl PackageArchive for PackageFile {
    async fn create(
        &self,
        package_data: &PackageData,
        installer: Option<&Path>,
        key_pair: &KeyPair,
        output: &Path,
    ) -> Result<PathBuf, ArchiveError> {
        let package_data = package_data.clone();
        let installer = installer.map(Path::to_path_buf);
        let key_pair = key_pair.clone();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<PathBuf, ArchiveError> {
            write_archive(&package_data, installer.as_deref(), &key_pair, &output)?;
            Ok(output)
        })
        .await
        .map_err(io::Error::other)?
    }

    async fn read(&self, archive: &Path) -> Result<ArchiveInfo, ArchiveError> {
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || read_archive(&archive))
            .await
            .map_err(io::Error::other)?
    }
}

fn sign(data: &[u8], key_pair: &KeyPair) -> Result<Vec<u8>, ArchiveError> {
    let key = PKey::private_key_from_pem_passphrase(
        key_pair.private_key(),
        key_pair.passphrase().as_bytes(),
    )?;
    let mut signer = Signer::new(MessageDigest::sha256(), &key)?;
    signer.update(data)?;
    Ok(signer.sign_to_vec()?)
}

/// Serialize the header, fixing up `installerOffset` until it accounts for
/// the header's own length.
fn encode_header(
    package_data_length: u64,
    signature_length: u64,
    installer_length: Option<u64>,
) -> Result<(ArchiveHeader, Vec<u8>), ArchiveError> {
    let mut header = ArchiveHeader {
        version: FORMAT_VERSION,
        package_data_length,
        signature_length,
        installer_length,
        installer_offset: installer_length.map(|_| 0),
    };

    loop {
        let bytes = serde_json::to_vec(&header)?;
        let offset = PREFIX_LEN + bytes.len() as u64 + package_data_length + signature_length;
        if installer_length.is_none() || header.installer_offset == Some(offset) {
            return Ok((header, bytes));
        }
        header.installer_offset = Some(offset);
    }
}

fn write_archive(
    package_data: &PackageData,
    installer: Option<&Path>,
    key_pair: &KeyPair,
    output: &Path,
) -> Result<(), ArchiveError> {
    let json = package_data.to_json()?;
    let signature = sign(json.as_bytes(), key_pair)?;

    let installer = installer
        .map(|path| -> io::Result<(File, u64)> {
            let file = File::open(path)?;
            let len = file.metadata()?.len();
            Ok((file, len))
        })
        .transpose()?;

    let (header, header_bytes) = encode_header(
        json.len() as u64,
        signature.len() as u64,
        installer.as_ref().map(|(_, len)| *len),
    )?;

    let mut tmp = output.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = (|| -> Result<(), ArchiveError> {
        let mut out = BufWriter::new(File::create(&tmp)?);
        out.write_all(&MAGIC)?;
        out.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
        out.write_all(&header_bytes)?;
        out.write_all(json.as_bytes())?;
        out.write_all(&signature)?;

        if let Some((file, expected)) = installer {
            let copied = io::copy(&mut BufReader::new(file), &mut out)?;
            if copied != expected {
                return Err(ArchiveError::malformed(
                    output,
                    format!("installer changed while copying ({copied} of {expected} bytes)"),
                ));
            }
        }

        let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        fs::rename(&tmp, output)?;
        Ok(())
    })();

    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    } else {
        debug!(
            archive = %output.display(),
            installer_offset = ?header.installer_offset,
            "wrote package file"
        );
    }
    written
}

fn read_exact_vec(
    reader: &mut impl Read,
    len: u64,
    path: &Path,
    what: &str,
) -> Result<Vec<u8>, ArchiveError> {
    let mut buf = Vec::new();
    reader.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(ArchiveError::malformed(path, format!("truncated {what}")));
    }
    Ok(buf)
}

fn read_archive(path: &Path) -> Result<ArchiveInfo, ArchiveError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let magic = read_exact_vec(&mut reader, MAGIC.len() as u64, path, "magic")?;
    if magic != MAGIC {
        return Err(ArchiveError::malformed(path, "not a package file"));
    }

    let len_bytes = read_exact_vec(&mut reader, 4, path, "header length")?;
    let header_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    if header_len == 0 || header_len > MAX_HEADER_LEN {
        return Err(ArchiveError::malformed(
            path,
            format!("implausible header length {header_len}"),
        ));
    }

    let header_bytes = read_exact_vec(&mut reader, u64::from(header_len), path, "header")?;
    let header: ArchiveHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| ArchiveError::malformed(path, format!("bad header: {e}")))?;
    if header.version != FORMAT_VERSION {
        return Err(ArchiveError::malformed(
            path,
            format!("unsupported version {}", header.version),
        ));
    }

    let body_start = PREFIX_LEN + u64::from(header_len);
    let sections_end = body_start
        .checked_add(header.package_data_length)
        .and_then(|n| n.checked_add(header.signature_length))
        .filter(|end| *end <= file_len)
        .ok_or_else(|| ArchiveError::malformed(path, "section lengths exceed file size"))?;

    match (header.installer_length, header.installer_offset) {
        (Some(len), Some(offset)) => {
            if offset != sections_end || offset.checked_add(len) != Some(file_len) {
                return Err(ArchiveError::malformed(path, "installer section mismatch"));
            }
        }
        (None, None) => {
            if sections_end != file_len {
                return Err(ArchiveError::malformed(path, "trailing data"));
            }
        }
        _ => return Err(ArchiveError::malformed(path, "incomplete installer fields")),
    }

    let json_bytes = read_exact_vec(&mut reader, header.package_data_length, path, "package data")?;
    let package_data_json = String::from_utf8(json_bytes)
        .map_err(|_| ArchiveError::malformed(path, "package data is not UTF-8"))?;
    let package_data = PackageData::parse_json(&package_data_json)?;
    let signature = read_exact_vec(&mut reader, header.signature_length, path, "signature")?;

    Ok(ArchiveInfo {
        header,
        package_data_json,
        package_data,
        signature,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::rsa::Rsa;
    use openssl::symm::Cipher;
    use std::sync::OnceLock;
    use tempfile::TempDir;

    /// (encrypted private PEM, public PEM), generated once per test binary.
    fn test_keys() -> &'static (Vec<u8>, Vec<u8>) {
        static KEYS: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let rsa = Rsa::generate(2048).unwrap();
            let private = rsa
                .private_key_to_pem_passphrase(Cipher::aes_128_cbc(), b"pw")
                .unwrap();
            let public = PKey::from_rsa(rsa).unwrap().public_key_to_pem().unwrap();
            (private, public)
        })
    }

    fn key_pair(passphrase: &str) -> KeyPair {
        let (private, public) = test_keys();
        let mut public_file = b"Fingerprint=sha256:x\n\n".to_vec();
        public_file.extend_from_slice(public);
        KeyPair::new(private.clone(), public_file, passphrase)
    }

    fn package_data() -> PackageData {
        PackageData::parse_relaxed("{ name: 'demo', installerType: 'msi' }").unwrap()
    }

    #[tokio::test]
    async fn round_trips_with_installer() {
        let dir = TempDir::new().unwrap();
        let installer = dir.path().join("setup.msi");
        fs::write(&installer, b"installer payload bytes").unwrap();
        let output = dir.path().join("demo.morphic-package");
        let keys = key_pair("pw");

        let archive = PackageFile::new();
        let written = archive
            .create(&package_data(), Some(&installer), &keys, &output)
            .await
            .unwrap();
        assert_eq!(written, output);

        let info = archive.read(&output).await.unwrap();
        assert_eq!(info.package_data, package_data());
        assert_eq!(info.package_data_json, package_data().to_json().unwrap());
        assert!(PackageFile::verify(&info, keys.public_key()).unwrap());

        let offset = info.header.installer_offset.unwrap() as usize;
        let len = info.header.installer_length.unwrap() as usize;
        let bytes = fs::read(&output).unwrap();
        assert_eq!(&bytes[offset..offset + len], b"installer payload bytes");
        assert!(!dir.path().join("demo.morphic-package.tmp").exists());
    }

    #[tokio::test]
    async fn archive_without_installer_has_no_offset() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("demo.morphic-package");

        let archive = PackageFile::new();
        archive
            .create(&package_data(), None, &key_pair("pw"), &output)
            .await
            .unwrap();

        let info = archive.read(&output).await.unwrap();
        assert!(!info.header.has_installer());
        assert_eq!(info.header.installer_offset, None);
    }

    #[tokio::test]
    async fn tampered_package_data_fails_verification() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("demo.morphic-package");
        let keys = key_pair("pw");

        let archive = PackageFile::new();
        archive
            .create(&package_data(), None, &keys, &output)
            .await
            .unwrap();

        let mut info = archive.read(&output).await.unwrap();
        info.package_data_json = info.package_data_json.replace("msi", "exe");
        assert!(!PackageFile::verify(&info, keys.public_key()).unwrap());
    }

    #[tokio::test]
    async fn wrong_passphrase_fails_create() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("demo.morphic-package");

        let err = PackageFile::new()
            .create(&package_data(), None, &key_pair("nope"), &output)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Crypto(_)));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn missing_installer_fails_create() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("demo.morphic-package");

        let err = PackageFile::new()
            .create(
                &package_data(),
                Some(&dir.path().join("absent.msi")),
                &key_pair("pw"),
                &output,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn rejects_non_archives_and_truncation() {
        let dir = TempDir::new().unwrap();
        let archive = PackageFile::new();

        let junk = dir.path().join("junk");
        fs::write(&junk, b"definitely not a package").unwrap();
        assert!(matches!(
            archive.read(&junk).await,
            Err(ArchiveError::Malformed { .. })
        ));

        let output = dir.path().join("demo.morphic-package");
        archive
            .create(&package_data(), None, &key_pair("pw"), &output)
            .await
            .unwrap();
        let bytes = fs::read(&output).unwrap();
        let truncated = dir.path().join("truncated");
        fs::write(&truncated, &bytes[..bytes.len() - 10]).unwrap();
        assert!(matches!(
            archive.read(&truncated).await,
            Err(ArchiveError::Malformed { .. })
        ));

        assert!(matches!(
            archive.read(&dir.path().join("absent")).await,
            Err(ArchiveError::Io(_))
        ));
    }

    #[test]
    fn header_offset_accounts_for_its_own_length() {
        let (header, bytes) = encode_header(10, 256, Some(5)).unwrap();
        assert_eq!(
            header.installer_offset,
            Some(PREFIX_LEN + bytes.len() as u64 + 10 + 256)
        );

        let (header, _) = encode_header(10, 256, None).unwrap();
        assert_eq!(header.installer_offset, None);
    }
}
