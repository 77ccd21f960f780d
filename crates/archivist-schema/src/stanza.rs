//! deb822 control-data parsing.
//!
//! `Sources`, `Packages`, `InRelease`, `.dsc` and `.changes` files all share
//! the same layout: paragraphs of `Field: value` lines separated by blank
//! lines, with continuation lines indented by whitespace.

use serde::{Deserialize, Serialize};

use crate::types::SchemaError;

const PGP_SIGNED_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const PGP_SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";

/// One paragraph of deb822 data with field order preserved.
///
/// Field lookup is case-insensitive, as in dpkg. Multi-line values are kept
/// as newline separated text with the continuation indent removed; the
/// first line is empty for fields like `Files` that start on the next line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stanza {
    fields: Vec<(String, String)>,
}

impl Stanza {
    /// Create an empty stanza.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse exactly one stanza from `text`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MalformedStanza`] on syntax errors or when the
    /// text does not contain any paragraph.
    pub fn parse_one(text: &str) -> Result<Self, SchemaError> {
        parse_stanzas(text)?
            .into_iter()
            .next()
            .ok_or_else(|| SchemaError::MalformedStanza("no paragraph found".to_string()))
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a field, treating an empty value as absent.
    pub fn get_nonempty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// True if the field is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove a field, returning its value.
    pub fn take(&mut self, name: &str) -> Option<String> {
        let pos = self
            .fields
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.fields.remove(pos).1)
    }

    /// Set a field, replacing an existing value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self
            .fields
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// Iterate over fields in file order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Non-empty lines of a multi-line field.
    pub fn lines(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|v| {
                v.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True if the stanza has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Turn the remaining fields into an [`ExtraFields`] map.
    pub fn into_extra(self) -> ExtraFields {
        ExtraFields(
            self.fields
                .into_iter()
                .map(|(k, v)| {
                    let value = if v.contains('\n') {
                        ExtraValue::List(
                            v.lines()
                                .map(str::trim)
                                .filter(|l| !l.is_empty())
                                .map(str::to_string)
                                .collect(),
                        )
                    } else {
                        ExtraValue::Text(v)
                    };
                    (k, value)
                })
                .collect(),
        )
    }
}

impl std::fmt::Display for Stanza {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (name, value) in &self.fields {
            let mut lines = value.split('\n');
            let first = lines.next().unwrap_or_default();
            if first.is_empty() {
                writeln!(f, "{name}:")?;
            } else {
                writeln!(f, "{name}: {first}")?;
            }
            for line in lines {
                if line.is_empty() {
                    writeln!(f, " .")?;
                } else {
                    writeln!(f, " {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// Parse every paragraph in `text`.
///
/// Comment lines starting with `#` are ignored.
///
/// # Errors
///
/// Returns [`SchemaError::MalformedStanza`] for a line that is neither a
/// field, a continuation nor a paragraph separator.
pub fn parse_stanzas(text: &str) -> Result<Vec<Stanza>, SchemaError> {
    let mut stanzas = Vec::new();
    let mut current = Stanza::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim_end();
        if line.is_empty() {
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            let Some((_, value)) = current.fields.last_mut() else {
                return Err(SchemaError::MalformedStanza(format!(
                    "line {}: continuation without a field",
                    lineno + 1
                )));
            };
            let content = line.trim_start();
            value.push('\n');
            if content != "." {
                value.push_str(content);
            }
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(SchemaError::MalformedStanza(format!(
                "line {}: expected 'Field: value', got '{line}'",
                lineno + 1
            )));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(SchemaError::MalformedStanza(format!(
                "line {}: empty field name",
                lineno + 1
            )));
        }
        current
            .fields
            .push((name.to_string(), value.trim().to_string()));
    }
    if !current.is_empty() {
        stanzas.push(current);
    }
    Ok(stanzas)
}

/// Remove OpenPGP clear-sign armor without checking the signature.
///
/// Text that is not clear-signed is returned unchanged.
pub fn strip_clearsign(text: &str) -> String {
    let mut lines = text.lines();
    if lines.clone().next().map(str::trim_end) != Some(PGP_SIGNED_HEADER) {
        return text.to_string();
    }
    lines.next();
    // armor headers such as "Hash: SHA512" run until the first blank line
    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
    }
    let mut out = String::new();
    for line in lines {
        if line.trim_end() == PGP_SIGNATURE_HEADER {
            break;
        }
        out.push_str(line.strip_prefix("- ").unwrap_or(line));
        out.push('\n');
    }
    out
}

/// A value of an unmodeled control field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    /// Single-line field.
    Text(String),
    /// Multi-line field, one entry per line.
    List(Vec<String>),
}

/// Ordered map of control fields the data model does not know about.
///
/// Stored alongside package records so no upstream metadata is lost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraFields(Vec<(String, ExtraValue)>);

impl ExtraFields {
    /// Look up a field by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ExtraValue> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no extra field was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in original field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtraValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = "\
Package: 0ad
Binary: 0ad
Version: 0.0.20-1
Files:
 27da8db8d7a6da1bd2bb52e23c0ef8b7 2455 0ad_0.0.20-1.dsc
 9f22e3f4c7b0c1e8e3e0ef3a2b0cf5e1 31765240 0ad_0.0.20.orig.tar.xz
Description: real-time strategy game
 of ancient warfare
 .
 second paragraph

# trailing comment
Package: zlib
Version: 1:1.2.11.dfsg-1
";

    #[test]
    fn parses_paragraphs_and_continuations() {
        let stanzas = parse_stanzas(SOURCES).unwrap();
        assert_eq!(stanzas.len(), 2);
        let first = &stanzas[0];
        assert_eq!(first.get("package"), Some("0ad"));
        assert_eq!(first.lines("Files").len(), 2);
        assert!(first.get("Files").unwrap().starts_with('\n'));
        assert_eq!(
            first.get("Description"),
            Some("real-time strategy game\nof ancient warfare\n\nsecond paragraph")
        );
        assert_eq!(stanzas[1].get("Version"), Some("1:1.2.11.dfsg-1"));
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(parse_stanzas("Package: foo\nthis is not a field\n").is_err());
        assert!(parse_stanzas(" leading continuation\n").is_err());
    }

    #[test]
    fn take_and_extra_fields_keep_order() {
        let mut stanza = Stanza::parse_one(SOURCES).unwrap();
        assert_eq!(stanza.take("Package").as_deref(), Some("0ad"));
        assert!(!stanza.contains("Package"));
        let extra = stanza.into_extra();
        let names: Vec<_> = extra.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Binary", "Version", "Files", "Description"]);
        assert!(matches!(extra.get("files"), Some(ExtraValue::List(l)) if l.len() == 2));
        assert!(matches!(extra.get("binary"), Some(ExtraValue::Text(t)) if t == "0ad"));
    }

    #[test]
    fn display_round_trips_multiline_values() {
        let stanza = Stanza::parse_one(SOURCES).unwrap();
        let reparsed = Stanza::parse_one(&stanza.to_string()).unwrap();
        assert_eq!(stanza, reparsed);
    }

    #[test]
    fn strips_clearsign_armor() {
        let signed = "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA512\n\nFormat: 3.0 (quilt)\n- -dash-escaped\nSource: foo\n-----BEGIN PGP SIGNATURE-----\n\nabc\n-----END PGP SIGNATURE-----\n";
        assert_eq!(
            strip_clearsign(signed),
            "Format: 3.0 (quilt)\n-dash-escaped\nSource: foo\n"
        );
        assert_eq!(strip_clearsign("Source: foo\n"), "Source: foo\n");
    }
}
