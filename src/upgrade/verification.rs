use md5::Md5;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use tracing::debug;

use crate::core::{Result, UpdateError};

/// Digest used to check a downloaded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// MD5, the digest published in the manifest's `md5` field.
    Md5,
    /// SHA-256, selected by a `sha256:` prefix or a 64-character digest.
    Sha256,
}

impl DigestAlgorithm {
    /// Pick the algorithm implied by an expected digest string.
    ///
    /// Returns the algorithm and the bare hex digest.
    #[must_use]
    pub fn detect(expected: &str) -> (Self, &str) {
        let expected = expected.trim();
        if let Some(hex) = expected.strip_prefix("sha256:") {
            (Self::Sha256, hex)
        } else if let Some(hex) = expected.strip_prefix("md5:") {
            (Self::Md5, hex)
        } else if expected.len() == 64 {
            (Self::Sha256, expected)
        } else {
            (Self::Md5, expected)
        }
    }
}

/// Verifies downloaded payloads against the digest published in the manifest.
///
/// The digest guards against truncated or corrupted downloads, not tampering:
/// anyone who can rewrite the asset can rewrite the manifest too.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Hash everything `reader` yields and return the lowercase hex digest.
    pub fn compute(reader: &mut dyn Read, algorithm: DigestAlgorithm) -> io::Result<String> {
        match algorithm {
            DigestAlgorithm::Md5 => hash_reader::<Md5>(reader),
            DigestAlgorithm::Sha256 => hash_reader::<Sha256>(reader),
        }
    }

    /// Hash the full stream and compare with `expected` (case-insensitive).
    ///
    /// An empty `expected` digest never validates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use selfup::upgrade::ChecksumVerifier;
    ///
    /// let mut payload: &[u8] = b"Hello, World!";
    /// ChecksumVerifier::validate(&mut payload, "65A8E27D8879283831B664BD8B7F0AD4").unwrap();
    /// ```
    pub fn validate(reader: &mut dyn Read, expected: &str) -> Result<()> {
        let (algorithm, expected_hex) = DigestAlgorithm::detect(expected);
        if expected_hex.is_empty() {
            return Err(UpdateError::ChecksumMismatch {
                expected: "<none published>".to_string(),
                actual: "<not computed>".to_string(),
            });
        }

        let actual = Self::compute(reader, algorithm).map_err(|e| UpdateError::Io {
            operation: "reading payload for checksum".to_string(),
            path: Default::default(),
            source: e,
        })?;
        debug!("Computed {algorithm:?} digest {actual}");

        if !actual.eq_ignore_ascii_case(expected_hex) {
            return Err(UpdateError::ChecksumMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(())
    }
}

fn hash_reader<D: Digest>(reader: &mut dyn Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
