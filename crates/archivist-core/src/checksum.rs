//! Artifact verification against declared checksums.

use std::path::Path;

use archivist_schema::{ArchiveFile, FileHashes, HashAlgorithm, hash_file};

use crate::error::{ArchiveError, Result};

/// Number of digest algorithms that must be checked for a file to be admitted.
pub const REQUIRED_HASH_CHECKS: usize = HashAlgorithm::ALL.len();

/// Verify `path` against the sizes and digests declared in `file`.
///
/// Every declared digest is compared; the first disagreement fails with
/// [`ArchiveError::ChecksumMismatch`] naming the algorithm and both
/// values. A declared size must match as well. Declaring fewer than
/// [`REQUIRED_HASH_CHECKS`] digests fails with
/// [`ArchiveError::InsufficientHashes`].
///
/// # Errors
///
/// See above; I/O errors reading the file are propagated.
pub fn verify_file(path: &Path, file: &ArchiveFile) -> Result<FileHashes> {
    let actual = hash_file(path).map_err(|e| ArchiveError::io_at(path, e))?;
    verify_hashes(&actual, file)?;
    Ok(actual)
}

/// Compare precomputed hashes with the declarations in `file`.
///
/// # Errors
///
/// Same as [`verify_file`].
pub fn verify_hashes(actual: &FileHashes, file: &ArchiveFile) -> Result<()> {
    if let Some(expected) = file.size {
        if expected != actual.size {
            return Err(ArchiveError::SizeMismatch {
                file: file.fname.clone(),
                expected,
                actual: actual.size,
            });
        }
    }

    let mut checked = 0;
    for algorithm in HashAlgorithm::ALL {
        let Some(expected) = file.digest(algorithm) else {
            continue;
        };
        let computed = actual.get(algorithm);
        if expected != computed {
            return Err(ArchiveError::ChecksumMismatch {
                file: file.fname.clone(),
                algorithm: algorithm.as_str(),
                expected: expected.to_string(),
                actual: computed.to_string(),
            });
        }
        checked += 1;
    }

    if checked < REQUIRED_HASH_CHECKS {
        return Err(ArchiveError::InsufficientHashes {
            file: file.fname.clone(),
            checked,
            required: REQUIRED_HASH_CHECKS,
        });
    }
    Ok(())
}

/// Build an [`ArchiveFile`] declaring every digest of `hashes`.
pub fn declared_from(fname: impl Into<String>, hashes: &FileHashes) -> ArchiveFile {
    let mut file = ArchiveFile::new(fname);
    file.size = Some(hashes.size);
    for algorithm in HashAlgorithm::ALL {
        file.set_digest(algorithm, hashes.get(algorithm).clone());
    }
    file
}
