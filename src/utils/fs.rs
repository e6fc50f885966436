//! Filesystem helpers with bounded retry for transient OS errors.
//!
//! Removing or copying files right after a previous build (or while an
//! editor, indexer or antivirus still holds a handle) can fail with
//! "permission denied" or "resource busy". Those errors are retried a few
//! times with a growing delay before they propagate.

use crate::log;
use std::{
    fs, io,
    path::Path,
    thread,
    time::Duration,
};

/// Attempts made before a transient error is returned to the caller.
pub const MAX_ATTEMPTS: u32 = 5;

/// Delay unit; attempt `n` waits `n * BACKOFF`.
const BACKOFF: Duration = Duration::from_millis(100);

/// Errors worth retrying: the resource is held by someone else for now.
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::DirectoryNotEmpty
    )
}

/// Run `op` until it succeeds, fails with a non-transient error, or
/// `MAX_ATTEMPTS` is reached.
pub fn retry_io<T>(what: &str, op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    retry_with(what, MAX_ATTEMPTS, BACKOFF, op)
}

fn retry_with<T>(
    what: &str,
    attempts: u32,
    backoff: Duration,
    mut op: impl FnMut() -> io::Result<T>,
) -> io::Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts && is_transient(&err) => {
                log!("warn"; "{what}: {err}, retrying ({attempt}/{attempts})");
                thread::sleep(backoff * attempt);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Remove a directory tree; a missing directory counts as removed.
pub fn remove_dir_all(path: &Path) -> io::Result<()> {
    retry_io(&format!("remove {}", path.display()), || {
        match fs::remove_dir_all(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    })
}

/// Copy a file, creating the destination's parent directories.
pub fn copy_file(src: &Path, dest: &Path) -> io::Result<u64> {
    ensure_parent(dest)?;
    retry_io(&format!("copy {}", src.display()), || fs::copy(src, dest))
}

/// Write bytes to `dest`, creating its parent directories.
pub fn write_file(dest: &Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent(dest)?;
    retry_io(&format!("write {}", dest.display()), || fs::write(dest, contents))
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}
