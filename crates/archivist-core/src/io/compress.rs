//! Transparent decompression of repository index files.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::error::{ArchiveError, Result};

/// Compression variants an index may be published with, in order of preference.
pub const INDEX_EXTENSIONS: [&str; 3] = [".xz", ".gz", ""];

/// Open an index file, decompressing by extension.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened.
pub fn open_index(path: &Path) -> Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path).map_err(|e| ArchiveError::io_at(path, e))?);
    let name = path.to_string_lossy();
    Ok(if name.ends_with(".xz") {
        Box::new(XzDecoder::new(file))
    } else if name.ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    })
}

/// Read a whole index file as text.
///
/// # Errors
///
/// Returns [`ArchiveError::MalformedIndex`] for corrupt compressed data or
/// non-UTF-8 content.
pub fn read_index_text(path: &Path) -> Result<String> {
    let mut text = String::new();
    open_index(path)?
        .read_to_string(&mut text)
        .map_err(|e| ArchiveError::MalformedIndex(format!("{}: {e}", path.display())))?;
    Ok(text)
}
