//! Crash-safe file writes shared by the checkpoint store and transfer cache.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Suffix of the staging files written next to their destination.
pub(crate) const TMP_SUFFIX: &str = ".tmp";

/// Write `bytes` to `path` so that readers see either the old content or the
/// complete new content: stage a sibling temp file, fsync it, rename it over.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    stage(path, bytes)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Like [`write_atomic`], but never replaces an existing file. Publishing is
/// a single no-clobber link, so of two racing writers exactly one wins and
/// the other gets [`io::ErrorKind::AlreadyExists`].
pub(crate) fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    stage(path, bytes)?
        .persist_noclobber(path)
        .map_err(|e| e.error)?;
    Ok(())
}

/// The staging file is removed on drop, so every error path cleans up.
fn stage(path: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(TMP_SUFFIX)
        .tempfile_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    Ok(file)
}
