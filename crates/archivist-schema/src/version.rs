//! Debian package versions and their dpkg ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::types::SchemaError;

/// A Debian version string `[epoch:]upstream[-revision]`.
///
/// Equality and ordering follow dpkg, so `1:0.9` sorts above `2.0` and
/// `1.0~rc1` below `1.0`. The original text is kept verbatim for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DebVersion(String);

impl DebVersion {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidVersion`] for empty strings, strings
    /// containing whitespace, non-numeric epochs, epochs that do not fit a
    /// `u32` or an empty upstream part.
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let s = s.trim();
        let invalid = |reason: &str| SchemaError::InvalidVersion {
            value: s.to_string(),
            reason: reason.to_string(),
        };
        if s.is_empty() {
            return Err(invalid("empty version"));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }
        if let Some((epoch, _)) = s.split_once(':') {
            if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("epoch is not a number"));
            }
            if epoch.parse::<u32>().is_err() {
                return Err(invalid("epoch is too large"));
            }
        }
        let version = Self(s.to_string());
        if version.upstream().is_empty() {
            return Err(invalid("empty upstream version"));
        }
        Ok(version)
    }

    /// The full version text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric epoch, zero when absent.
    pub fn epoch(&self) -> u32 {
        self.0
            .split_once(':')
            .and_then(|(e, _)| e.parse().ok())
            .unwrap_or(0)
    }

    /// The version with any `epoch:` prefix removed, as used in pool filenames.
    pub fn without_epoch(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, rest)| rest)
    }

    /// Upstream part: no epoch, no Debian revision.
    pub fn upstream(&self) -> &str {
        let rest = self.without_epoch();
        rest.rsplit_once('-').map_or(rest, |(upstream, _)| upstream)
    }

    /// Debian revision, empty for native versions.
    pub fn revision(&self) -> &str {
        self.without_epoch()
            .rsplit_once('-')
            .map_or("", |(_, revision)| revision)
    }
}

impl std::fmt::Display for DebVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DebVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DebVersion {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DebVersion> for String {
    fn from(v: DebVersion) -> Self {
        v.0
    }
}

impl PartialEq for DebVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DebVersion {}

impl PartialOrd for DebVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DebVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch()
            .cmp(&other.epoch())
            .then_with(|| verrevcmp(self.upstream(), other.upstream()))
            .then_with(|| verrevcmp(self.revision(), other.revision()))
    }
}

/// Sort weight of a single character in the non-digit part of a version.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(c) => i32::from(c) + 256,
    }
}

/// dpkg's `verrevcmp`: alternate non-digit and digit runs.
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        let mut first_diff = 0;
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }
        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }
        while i < a.len() && a[i].is_ascii_digit() && j < b.len() && b[j].is_ascii_digit() {
            if first_diff == 0 {
                first_diff = i32::from(a[i]) - i32::from(b[j]);
            }
            i += 1;
            j += 1;
        }
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != 0 {
            return first_diff.cmp(&0);
        }
    }
    Ordering::Equal
}
