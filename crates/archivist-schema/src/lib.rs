//! Shared types for the archivist Debian archive engine.
//!
//! This crate holds the value types every other crate speaks: digests and
//! the multi-algorithm hasher, Debian version ordering, architecture names,
//! deb822 stanza parsing and the package records that flow between the
//! repository reader, the importer and the store.

pub mod arch;
pub mod hash;
pub mod stanza;
pub mod types;
pub mod version;

// Re-exports
pub use arch::*;
pub use hash::*;
pub use stanza::{ExtraFields, ExtraValue, Stanza};
pub use types::*;
pub use version::DebVersion;

/// Architecture name used by the version ledger for source packages.
pub const SOURCE_ARCH: &str = "source";
