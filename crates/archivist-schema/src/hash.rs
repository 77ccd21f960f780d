//! Checksums of archive files.

use std::io::Read;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Deserializer, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::types::SchemaError;

/// Digest algorithms an archive file can be verified with.
///
/// Every algorithm apt knows about is required for an artifact to be
/// admitted; see [`HashAlgorithm::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// MD5, the `Files` section of deb822 control data.
    Md5,
    /// SHA1, the `Checksums-Sha1` section.
    Sha1,
    /// SHA256, the `Checksums-Sha256` section.
    Sha256,
    /// SHA512, the `Checksums-Sha512` section.
    Sha512,
}

impl HashAlgorithm {
    /// All supported algorithms, weakest first.
    pub const ALL: [HashAlgorithm; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Display name, as used in error messages and release manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// Number of hex characters in a digest of this algorithm.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Name of the deb822 section listing files with this algorithm.
    pub fn section_name(&self) -> &'static str {
        match self {
            Self::Md5 => "Files",
            Self::Sha1 => "Checksums-Sha1",
            Self::Sha256 => "Checksums-Sha256",
            Self::Sha512 => "Checksums-Sha512",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated hex digest, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct HexDigest(String);

impl HexDigest {
    /// Validate `s` as a digest of `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidDigest`] if the length is wrong for the
    /// algorithm or the string contains non-hex characters.
    pub fn new(algorithm: HashAlgorithm, s: &str) -> Result<Self, SchemaError> {
        let s = s.trim();
        if s.len() != algorithm.hex_len() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SchemaError::InvalidDigest {
                algorithm: algorithm.as_str(),
                value: s.to_string(),
            });
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Wrap a digest string produced locally (already lowercase hex).
    fn computed(s: String) -> Self {
        Self(s)
    }

    /// Return the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HexDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for HexDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for HexDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.chars().all(|c| c.is_ascii_hexdigit()) && !s.is_empty() {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(serde::de::Error::custom(format!("invalid hex digest '{s}'")))
        }
    }
}

/// Digests of a file under every supported algorithm, plus its size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHashes {
    /// Size in bytes.
    pub size: u64,
    /// MD5 digest.
    pub md5: HexDigest,
    /// SHA1 digest.
    pub sha1: HexDigest,
    /// SHA256 digest.
    pub sha256: HexDigest,
    /// SHA512 digest.
    pub sha512: HexDigest,
}

impl FileHashes {
    /// Digest for one algorithm.
    pub fn get(&self, algorithm: HashAlgorithm) -> &HexDigest {
        match algorithm {
            HashAlgorithm::Md5 => &self.md5,
            HashAlgorithm::Sha1 => &self.sha1,
            HashAlgorithm::Sha256 => &self.sha256,
            HashAlgorithm::Sha512 => &self.sha512,
        }
    }
}

/// Streaming hasher computing all supported digests in one pass.
#[derive(Debug, Default, Clone)]
pub struct MultiHasher {
    size: u64,
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    sha512: Sha512,
}

impl MultiHasher {
    /// Create an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of data.
    pub fn update(&mut self, data: &[u8]) {
        self.size += data.len() as u64;
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha512.update(data);
    }

    /// Finish hashing and return the digests.
    pub fn finalize(self) -> FileHashes {
        FileHashes {
            size: self.size,
            md5: HexDigest::computed(hex::encode(self.md5.finalize())),
            sha1: HexDigest::computed(hex::encode(self.sha1.finalize())),
            sha256: HexDigest::computed(hex::encode(self.sha256.finalize())),
            sha512: HexDigest::computed(hex::encode(self.sha512.finalize())),
        }
    }
}

/// Hash everything readable from `reader`.
///
/// # Errors
///
/// Returns any I/O error raised while reading.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<FileHashes> {
    let mut hasher = MultiHasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Hash a file on disk under all supported algorithms.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> std::io::Result<FileHashes> {
    hash_reader(std::fs::File::open(path)?)
}

/// SHA256 of a file on disk, as lowercase hex.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests_of_hello() {
        let hashes = hash_reader(&b"hello\n"[..]).unwrap();
        assert_eq!(hashes.size, 6);
        assert_eq!(hashes.md5.as_str(), "b1946ac92492d2347c6235b4d2611184");
        assert_eq!(
            hashes.sha1.as_str(),
            "f572d396fae9206628714fb2ce00f72e94f2258f"
        );
        assert_eq!(
            hashes.sha256.as_str(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
        assert_eq!(hashes.sha512.as_str().len(), 128);
    }

    #[test]
    fn digest_validation_checks_length_and_charset() {
        assert!(HexDigest::new(HashAlgorithm::Md5, "b1946ac92492d2347c6235b4d2611184").is_ok());
        assert!(HexDigest::new(HashAlgorithm::Sha1, "b1946ac92492d2347c6235b4d2611184").is_err());
        assert!(HexDigest::new(HashAlgorithm::Md5, "z1946ac92492d2347c6235b4d2611184").is_err());

        let upper = HexDigest::new(HashAlgorithm::Md5, "B1946AC92492D2347C6235B4D2611184").unwrap();
        assert_eq!(upper.as_str(), "b1946ac92492d2347c6235b4d2611184");
    }

    #[test]
    fn file_and_reader_hashes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"some archive payload").unwrap();

        let from_file = hash_file(&path).unwrap();
        let from_reader = hash_reader(&b"some archive payload"[..]).unwrap();
        assert_eq!(from_file, from_reader);
        assert_eq!(sha256_file(&path).unwrap(), from_file.sha256.as_str());
    }
}
