//! Blocking downloads with streaming SHA256.
//!
//! Remote repositories are mirrored file by file into a local cache; every
//! download is hashed while it is written so callers can verify it against
//! a release manifest without reading it twice.

use std::io::{Read, Write};
use std::path::Path;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ArchiveError, Result};

/// HTTP client for repository mirrors.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Build a client identifying itself with [`crate::USER_AGENT`].
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Http`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(crate::USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Download `url` to `dest`, returning the SHA256 of the body.
    ///
    /// Returns `Ok(None)` when the server answers 404; `dest` is left
    /// untouched in that case. The file appears atomically once complete.
    ///
    /// # Errors
    ///
    /// Other HTTP failures and I/O errors are returned.
    pub fn download(&self, url: &str, dest: &Path) -> Result<Option<String>> {
        debug!(url, dest = %dest.display(), "downloading");
        let mut resp = self.client.get(url).send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if let Err(err) = resp.error_for_status_ref() {
            return Err(err.into());
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io_at(parent, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;

        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = resp.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n])?;
        }
        tmp.flush()?;
        tmp.persist(dest)
            .map_err(|e| ArchiveError::io_at(dest, e.error))?;

        Ok(Some(hex::encode(hasher.finalize())))
    }

    /// Download `url` and require the body to hash to `expected_sha256`.
    ///
    /// A mismatching download is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::ChecksumMismatch`] on a bad body, plus the
    /// errors of [`Fetcher::download`].
    pub fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: &str,
    ) -> Result<Option<()>> {
        let Some(actual) = self.download(url, dest)? else {
            return Ok(None);
        };
        if !actual.eq_ignore_ascii_case(expected_sha256) {
            std::fs::remove_file(dest).ok();
            return Err(ArchiveError::ChecksumMismatch {
                file: url.to_string(),
                algorithm: "SHA256",
                expected: expected_sha256.to_string(),
                actual,
            });
        }
        Ok(Some(()))
    }
}
