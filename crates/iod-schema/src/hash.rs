//! Public key fingerprints.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 fingerprint of a public key, base64 encoded.
///
/// Computed over the DER bytes of the key (not the PEM text), so the same
/// key always yields the same fingerprint regardless of line endings or
/// comment lines around the PEM block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Prefix used when the fingerprint is written next to a key.
    pub const LABEL: &'static str = "Fingerprint=sha256:";

    /// Compute the fingerprint of raw key bytes.
    pub fn compute(key_der: &[u8]) -> Self {
        let digest = Sha256::digest(key_der);
        Self(base64::engine::general_purpose::STANDARD.encode(digest))
    }

    /// Return the base64 digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The comment line placed at the top of a public key file.
    pub fn comment_line(&self) -> String {
        format!("{}{}", Self::LABEL, self.0)
    }

    /// Extract a fingerprint from a public key file's comment line, if any.
    pub fn from_comment(text: &str) -> Option<Self> {
        text.lines()
            .find_map(|line| line.trim().strip_prefix(Self::LABEL))
            .map(|value| Self(value.trim().to_string()))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_base64_sha256() {
        // sha256("abc"), base64
        let fp = Fingerprint::compute(b"abc");
        assert_eq!(fp.as_str(), "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=");
    }

    #[test]
    fn fingerprint_deterministic() {
        assert_eq!(Fingerprint::compute(b"key"), Fingerprint::compute(b"key"));
        assert_ne!(Fingerprint::compute(b"key"), Fingerprint::compute(b"other"));
    }

    #[test]
    fn comment_line_round_trips() {
        let fp = Fingerprint::compute(b"key");
        let file = format!("{}\n\n-----BEGIN PUBLIC KEY-----\n", fp.comment_line());
        assert_eq!(Fingerprint::from_comment(&file), Some(fp));
        assert_eq!(Fingerprint::from_comment("-----BEGIN PUBLIC KEY-----"), None);
    }
}
