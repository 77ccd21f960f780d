//! Core of the archivist Debian archive engine.
//!
//! Reading repositories ([`reader`]), admitting uploads ([`upload`],
//! [`importer`], [`newqueue`]) and the archive state they maintain
//! ([`store`]). Signature checks and control-data rendering are external
//! capabilities behind the [`signature::SignatureVerifier`] and
//! [`control::ControlRenderer`] traits.

pub mod changes;
pub mod checksum;
pub mod config;
pub mod control;
pub mod debcheck;
pub mod error;
pub mod importer;
pub mod io;
pub mod journal;
pub mod lock;
pub mod newqueue;
pub mod pool;
pub mod reader;
pub mod signature;
pub mod store;
pub mod upload;

pub use error::{ArchiveError, Result};

/// User Agent string for repository downloads
pub const USER_AGENT: &str = concat!("archivist/", env!("CARGO_PKG_VERSION"));
