//! OpenPGP signature verification.
//!
//! The archive only needs one capability from OpenPGP: "is this blob signed
//! by one of these keyrings, and by whom". [`SignatureVerifier`] is that
//! seam; [`GpgVerifier`] implements it with the `gpg` executable and its
//! machine-readable status protocol.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{ArchiveError, Result};

pub use archivist_schema::stanza::strip_clearsign;

/// Outcome of verifying a signed blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedContent {
    /// Payload with any signature armor removed.
    pub contents: Vec<u8>,
    /// At least one good signature and nothing invalid.
    pub valid: bool,
    /// The signature used SHA1 or RIPEMD160.
    pub weak_signature: bool,
    /// The signature or its key has expired.
    pub expired: bool,
    /// Fingerprints of the signing (sub)keys.
    pub fingerprints: Vec<String>,
    /// Fingerprints of the corresponding primary keys.
    pub primary_fingerprints: Vec<String>,
}

impl SignedContent {
    /// Unsigned content, as produced when verification is skipped.
    pub fn unverified(contents: Vec<u8>) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }

    /// Payload as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::MalformedIndex`] if the payload is not UTF-8.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.contents.clone())
            .map_err(|e| ArchiveError::MalformedIndex(format!("signed data is not UTF-8: {e}")))
    }

    /// The single primary fingerprint, if exactly one key signed.
    pub fn primary_fingerprint(&self) -> Option<&str> {
        match self.primary_fingerprints.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Verifies inline-signed data against a set of keyrings.
pub trait SignatureVerifier: std::fmt::Debug + Send + Sync {
    /// Verify `data`, returning its payload and signer information.
    ///
    /// With `require_signature`, a missing signature fails with
    /// [`ArchiveError::SignatureMissing`] and an untrusted one with
    /// [`ArchiveError::SignatureInvalid`]. Without it, the payload is
    /// returned with `valid` set accordingly.
    ///
    /// # Errors
    ///
    /// See above; failures to run the verifier are reported as I/O errors.
    fn verify(&self, data: &[u8], keyrings: &[PathBuf], require_signature: bool)
    -> Result<SignedContent>;
}

/// Signature verification through the `gpg` executable.
#[derive(Debug, Clone)]
pub struct GpgVerifier {
    gpg: PathBuf,
}

impl GpgVerifier {
    /// Use the given gpg executable, resolving bare names on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Config`] if the executable cannot be found.
    pub fn new(gpg: &str) -> Result<Self> {
        let path = Path::new(gpg);
        let gpg = if path.is_absolute() {
            path.to_path_buf()
        } else {
            which::which(gpg)
                .map_err(|e| ArchiveError::Config(format!("gpg executable '{gpg}': {e}")))?
        };
        Ok(Self { gpg })
    }
}

impl SignatureVerifier for GpgVerifier {
    fn verify(
        &self,
        data: &[u8],
        keyrings: &[PathBuf],
        require_signature: bool,
    ) -> Result<SignedContent> {
        let home = tempfile::tempdir()?;
        let output_path = home.path().join("payload");

        let mut cmd = Command::new(&self.gpg);
        cmd.arg("--homedir")
            .arg(home.path())
            .args([
                "--status-fd=1",
                "--no-default-keyring",
                "--batch",
                "--no-tty",
                "--trust-model",
                "always",
                "--fixed-list-mode",
                "--yes",
            ]);
        for keyring in keyrings {
            cmd.arg("--keyring").arg(keyring);
        }
        cmd.arg("--output")
            .arg(&output_path)
            .args(["--decrypt", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(gpg = %self.gpg.display(), keyrings = keyrings.len(), "verifying signature");
        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // gpg may stop reading early on garbage input
            if let Err(e) = stdin.write_all(data) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }
        let output = child.wait_with_output()?;
        let status_text = String::from_utf8_lossy(&output.stdout);
        let status = parse_status(&status_text)?;

        let contents = if output_path.exists() {
            std::fs::read(&output_path)?
        } else {
            Vec::new()
        };
        if status.lines_seen == 0 && !output.status.success() {
            return Err(ArchiveError::SignatureInvalid(format!(
                "gpg failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        status.into_content(contents, require_signature)
    }
}

/// Signature facts gathered from gpg's status output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpgStatus {
    /// A `VALIDSIG` line was seen.
    pub good: bool,
    /// A line marked the signature untrusted.
    pub invalid: bool,
    /// An expiry line was seen.
    pub expired: bool,
    /// SHA1 or RIPEMD160 was used.
    pub weak: bool,
    /// Any signature was present at all.
    pub signature_seen: bool,
    /// Signing key fingerprints.
    pub fingerprints: Vec<String>,
    /// Primary key fingerprints.
    pub primary_fingerprints: Vec<String>,
    /// Number of status lines parsed.
    pub lines_seen: usize,
    /// Reason recorded for the first invalidating line.
    pub reason: Option<String>,
}

impl GpgStatus {
    /// Combine the status with the decrypted payload.
    ///
    /// # Errors
    ///
    /// With `require_signature`, fails when the signature is missing or invalid.
    pub fn into_content(self, contents: Vec<u8>, require_signature: bool) -> Result<SignedContent> {
        let valid = self.good && !self.invalid;
        if require_signature && !valid {
            if !self.signature_seen {
                return Err(ArchiveError::SignatureMissing(
                    "no signature found in signed data".to_string(),
                ));
            }
            return Err(ArchiveError::SignatureInvalid(
                self.reason
                    .unwrap_or_else(|| "no valid signature found".to_string()),
            ));
        }
        Ok(SignedContent {
            contents,
            valid,
            weak_signature: self.weak,
            expired: self.expired,
            fingerprints: self.fingerprints,
            primary_fingerprints: self.primary_fingerprints,
        })
    }
}

/// Parse `--status-fd` output.
///
/// # Errors
///
/// MD5-based signatures and armor or data errors fail with
/// [`ArchiveError::SignatureInvalid`]; `NODATA` fails with
/// [`ArchiveError::SignatureMissing`].
pub fn parse_status(output: &str) -> Result<GpgStatus> {
    let mut status = GpgStatus::default();
    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some((&"[GNUPG:]", rest)) = fields.split_first() else {
            if line.trim().is_empty() {
                continue;
            }
            return Err(ArchiveError::SignatureInvalid(format!(
                "unexpected output on status-fd: {line}"
            )));
        };
        let Some(keyword) = rest.first() else {
            continue;
        };
        status.lines_seen += 1;
        match *keyword {
            // VALIDSIG <fpr> <date> <timestamp> <expire> <version> <reserved>
            //          <pubkey-algo> <hash-algo> <class> <primary-fpr>
            "VALIDSIG" => {
                status.signature_seen = true;
                match fields.get(9).copied() {
                    Some("1") => {
                        return Err(ArchiveError::SignatureInvalid(
                            "digest algorithm MD5 is not trusted".to_string(),
                        ));
                    }
                    Some("2" | "3") => status.weak = true,
                    _ => {}
                }
                status.good = true;
                if let Some(fpr) = fields.get(2) {
                    status.fingerprints.push((*fpr).to_string());
                }
                if let Some(fpr) = fields.get(11).or_else(|| fields.get(2)) {
                    status.primary_fingerprints.push((*fpr).to_string());
                }
            }
            "BADARMOR" => return Err(ArchiveError::SignatureInvalid("bad armor".to_string())),
            "NODATA" => {
                return Err(ArchiveError::SignatureMissing(
                    "no OpenPGP data found".to_string(),
                ));
            }
            "DECRYPTION_FAILED" => {
                return Err(ArchiveError::SignatureInvalid("decryption failed".to_string()));
            }
            "ERROR" => {
                let detail = fields.get(2..).map(|f| f.join(" ")).unwrap_or_default();
                return Err(ArchiveError::SignatureInvalid(format!("gpg error: {detail}")));
            }
            "EXPSIG" | "EXPKEYSIG" => {
                status.signature_seen = true;
                status.expired = true;
                status.invalid = true;
                status.reason.get_or_insert_with(|| "signature or key expired".to_string());
            }
            "REVKEYSIG" | "BADSIG" | "ERRSIG" | "KEYREVOKED" | "NO_PUBKEY" => {
                status.signature_seen = true;
                status.invalid = true;
                status
                    .reason
                    .get_or_insert_with(|| format!("{keyword} reported by gpg"));
            }
            "NEWSIG" | "GOODSIG" | "SIG_ID" => status.signature_seen = true,
            other => debug!(keyword = other, "ignoring gpg status line"),
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPR: &str = "C76B9F8A3D5C6E1F0A2B4C6D8E0F1A2B3C4D5E6F";
    const PRIMARY: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

    fn validsig(hash_algo: &str) -> String {
        format!(
            "[GNUPG:] NEWSIG\n[GNUPG:] GOODSIG 8E0F1A2B3C4D5E6F Jane <jane@example.org>\n\
             [GNUPG:] VALIDSIG {FPR} 2024-01-01 1704067200 0 4 0 1 {hash_algo} 01 {PRIMARY}\n"
        )
    }

    #[test]
    fn good_signature_reports_fingerprints() {
        let status = parse_status(&validsig("10")).unwrap();
        let content = status.into_content(b"payload".to_vec(), true).unwrap();
        assert!(content.valid);
        assert!(!content.weak_signature);
        assert_eq!(content.fingerprints, vec![FPR]);
        assert_eq!(content.primary_fingerprint(), Some(PRIMARY));
    }

    #[test]
    fn sha1_signature_is_weak() {
        let status = parse_status(&validsig("2")).unwrap();
        assert!(status.weak);
        assert!(status.into_content(Vec::new(), true).unwrap().weak_signature);
    }

    #[test]
    fn md5_signature_is_rejected() {
        assert!(matches!(
            parse_status(&validsig("1")),
            Err(ArchiveError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn expired_key_invalidates() {
        let status = parse_status(&format!("{}[GNUPG:] EXPKEYSIG 8E0F1A2B Jane\n", validsig("8")))
            .unwrap();
        assert!(status.expired);
        assert!(matches!(
            status.clone().into_content(Vec::new(), true),
            Err(ArchiveError::SignatureInvalid(_))
        ));
        let lenient = status.into_content(b"x".to_vec(), false).unwrap();
        assert!(!lenient.valid);
        assert_eq!(lenient.contents, b"x");
    }

    #[test]
    fn missing_key_is_invalid_not_missing() {
        let status = parse_status("[GNUPG:] NEWSIG\n[GNUPG:] ERRSIG 8E0F 1 10 01 1704067200 9\n[GNUPG:] NO_PUBKEY 8E0F\n").unwrap();
        assert!(matches!(
            status.into_content(Vec::new(), true),
            Err(ArchiveError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn unsigned_data_is_missing_signature() {
        assert!(matches!(
            parse_status("[GNUPG:] NODATA 1\n"),
            Err(ArchiveError::SignatureMissing(_))
        ));
        let empty = parse_status("").unwrap();
        assert!(matches!(
            empty.into_content(Vec::new(), true),
            Err(ArchiveError::SignatureMissing(_))
        ));
    }

    #[test]
    fn garbage_on_status_fd_is_rejected() {
        assert!(parse_status("gpg: something odd\n").is_err());
    }
}
