//! Architecture names and binary artifact flavours.

use serde::{Deserialize, Serialize};

/// A Debian architecture name such as `amd64`, `arm64` or `all`.
///
/// Archives carry ports we know nothing about, so this is an open set
/// rather than an enum. The pseudo-architecture `all` marks
/// architecture-independent packages.
///
/// # Example
///
/// ```
/// use archivist_schema::Architecture;
///
/// let arch = Architecture::new("all");
/// assert!(arch.is_all());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Architecture(String);

impl Architecture {
    /// Wrap an architecture name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The architecture-independent pseudo-architecture.
    pub fn all() -> Self {
        Self("all".to_string())
    }

    /// True for `all`.
    pub fn is_all(&self) -> bool {
        self.0 == "all"
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split a whitespace separated `Architecture:` field.
    pub fn parse_list(field: &str) -> Vec<Self> {
        field.split_whitespace().map(Self::new).collect()
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Architecture {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for Architecture {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Architecture {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Flavour of a binary package artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DebType {
    /// A regular `.deb`.
    #[default]
    Deb,
    /// A debian-installer `.udeb`.
    Udeb,
}

impl DebType {
    /// Convert to string representation, which is also the file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deb => "deb",
            Self::Udeb => "udeb",
        }
    }

    /// Guess the type from an artifact filename.
    pub fn from_filename(name: &str) -> Option<Self> {
        if name.ends_with(".udeb") {
            Some(Self::Udeb)
        } else if name.ends_with(".deb") {
            Some(Self::Deb)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DebType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DebType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deb" => Ok(Self::Deb),
            "udeb" => Ok(Self::Udeb),
            _ => Err(format!("Unknown package type: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_architecture_lists() {
        let archs = Architecture::parse_list("amd64  arm64\ti386");
        assert_eq!(archs.len(), 3);
        assert_eq!(archs[1], "arm64");
        assert!(!archs[0].is_all());
    }

    #[test]
    fn deb_type_from_filename() {
        assert_eq!(DebType::from_filename("foo_1.0_all.udeb"), Some(DebType::Udeb));
        assert_eq!(DebType::from_filename("foo_1.0_amd64.deb"), Some(DebType::Deb));
        assert_eq!(DebType::from_filename("foo_1.0.dsc"), None);
        assert_eq!("UDEB".parse::<DebType>(), Ok(DebType::Udeb));
    }
}
