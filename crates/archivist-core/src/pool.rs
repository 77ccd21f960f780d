//! Pool layout and artifact placement.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use archivist_schema::{Architecture, DebType, DebVersion, NewPolicy};

use crate::error::{ArchiveError, Result};

/// Pool directory of a source package, relative to the repository root.
///
/// Sources are bucketed by their first letter, or by their first four
/// letters when the name starts with `lib`. The layout is
/// `pool/<bucket>/<name>` with no component level, unlike the
/// `pool/<component>/<bucket>/<name>` trees of dak-style archives.
///
/// ```
/// use archivist_core::pool::pool_subdir;
///
/// assert_eq!(pool_subdir("foo"), "pool/f/foo");
/// assert_eq!(pool_subdir("libfoo"), "pool/libf/libfoo");
/// ```
pub fn pool_subdir(source_name: &str) -> String {
    let bucket = if source_name.starts_with("lib") {
        source_name.get(..4).unwrap_or(source_name)
    } else {
        source_name.get(..1).unwrap_or(source_name)
    };
    format!("pool/{bucket}/{source_name}")
}

/// Pool filename of a binary artifact: `<name>_<version>_<arch>.<deb|udeb>`.
///
/// The epoch is not part of the filename.
pub fn binary_pool_filename(
    name: &str,
    version: &DebVersion,
    arch: &Architecture,
    deb_type: DebType,
) -> String {
    format!("{name}_{}_{arch}.{deb_type}", version.without_epoch())
}

/// Where an upload lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Published into the pool.
    Pool,
    /// Held in the NEW queue for review.
    NewQueue,
}

/// Decide between the pool and the NEW queue.
///
/// A never-NEW suite always publishes (missing overrides get registered by
/// the caller), even for uploaders that are forced through review.
/// Otherwise uploads go to NEW when overrides are missing, the suite is
/// always-NEW, or the uploader is forced through review.
pub fn route_new_or_pool(missing_overrides: bool, policy: NewPolicy, force_review: bool) -> Route {
    match policy {
        NewPolicy::NeverNew => Route::Pool,
        NewPolicy::AlwaysNew => Route::NewQueue,
        NewPolicy::Default if missing_overrides || force_review => Route::NewQueue,
        NewPolicy::Default => Route::Pool,
    }
}

/// Put `src` at `dst`, never replacing an existing file.
///
/// The destination is created atomically (hard link, or an exclusive
/// create when crossing filesystems), so of two racing placements on the
/// same path exactly one succeeds. Unless `retain` is set the source is
/// removed afterwards.
///
/// # Errors
///
/// Returns [`ArchiveError::DestinationExists`] if `dst` exists, or any
/// I/O error.
pub fn place_file(src: &Path, dst: &Path, retain: bool) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io_at(parent, e))?;
    }
    match std::fs::hard_link(src, dst) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(ArchiveError::DestinationExists(dst.to_path_buf()));
        }
        Err(_) => copy_exclusive(src, dst)?,
    }
    if !retain {
        std::fs::remove_file(src).map_err(|e| ArchiveError::io_at(src, e))?;
    }
    Ok(())
}

fn copy_exclusive(src: &Path, dst: &Path) -> Result<()> {
    let mut input = std::fs::File::open(src).map_err(|e| ArchiveError::io_at(src, e))?;
    let mut output = match OpenOptions::new().write(true).create_new(true).open(dst) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(ArchiveError::DestinationExists(dst.to_path_buf()));
        }
        Err(e) => return Err(ArchiveError::io_at(dst, e)),
    };
    if let Err(e) = std::io::copy(&mut input, &mut output).and_then(|_| output.sync_all()) {
        // a half-written file must not stay behind in the pool
        let _ = std::fs::remove_file(dst);
        return Err(ArchiveError::io_at(dst, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn pool_subdir_buckets() {
        assert_eq!(pool_subdir("0ad"), "pool/0/0ad");
        assert_eq!(pool_subdir("libfoo"), "pool/libf/libfoo");
        assert_eq!(pool_subdir("lib"), "pool/lib/lib");
        assert_eq!(pool_subdir("zlib"), "pool/z/zlib");
    }

    #[test]
    fn binary_filenames_drop_epoch() {
        let version = DebVersion::parse("1:2.0-1").unwrap();
        assert_eq!(
            binary_pool_filename("foo", &version, &Architecture::new("amd64"), DebType::Deb),
            "foo_2.0-1_amd64.deb"
        );
        assert_eq!(
            binary_pool_filename("foo-udeb", &version, &Architecture::all(), DebType::Udeb),
            "foo-udeb_2.0-1_all.udeb"
        );
    }

    #[test]
    fn routing_table() {
        use NewPolicy::{AlwaysNew, Default, NeverNew};
        assert_eq!(route_new_or_pool(false, Default, false), Route::Pool);
        assert_eq!(route_new_or_pool(true, Default, false), Route::NewQueue);
        assert_eq!(route_new_or_pool(false, Default, true), Route::NewQueue);
        assert_eq!(route_new_or_pool(false, AlwaysNew, false), Route::NewQueue);
        assert_eq!(route_new_or_pool(true, NeverNew, true), Route::Pool);
    }

    #[test]
    fn place_moves_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("incoming.deb");
        let dst = dir.path().join("pool/f/foo/foo_1.0_amd64.deb");
        std::fs::write(&src, b"first").unwrap();

        place_file(&src, &dst, false).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"first");

        std::fs::write(&src, b"second").unwrap();
        assert!(matches!(
            place_file(&src, &dst, true),
            Err(ArchiveError::DestinationExists(_))
        ));
        assert_eq!(std::fs::read(&dst).unwrap(), b"first");
        assert!(src.exists());
    }

    #[test]
    fn racing_placements_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("pool/f/foo/foo_1.0_amd64.deb");
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let src = dir.path().join(format!("upload{i}.deb"));
                std::fs::write(&src, format!("payload {i}")).unwrap();
                let dst = dst.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    place_file(&src, &dst, true).map(|()| i)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(ArchiveError::DestinationExists(_)))));
        let expected = format!("payload {}", winners[0]);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), expected);
    }
}
