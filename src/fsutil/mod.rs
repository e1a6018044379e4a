// src/fsutil/mod.rs

//! Filesystem support: scratch files, atomic replacement and the sidecar
//! hash cache.
//!
//! Every file this crate publishes is written to a scratch file in the same
//! directory as its destination and atomically renamed into place, so a
//! concurrent reader observes either the old complete file or the new one,
//! never a partial write. Cross-process writers racing on the same
//! content-addressed path are safe for the same reason.

use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A temporary scratch file which will replace `destination` when committed.
///
/// Dropping the guard without committing deletes the scratch file, covering
/// every error path. Cleanup is best-effort and allowed to fail silently.
pub struct ScratchFile {
    temp: tempfile::TempPath,
    destination: PathBuf,
}

impl ScratchFile {
    /// Create a scratch file next to `destination`.
    ///
    /// The scratch file lives in the same directory so the final rename
    /// never crosses a filesystem boundary.
    pub fn new(destination: impl Into<PathBuf>) -> Result<Self> {
        let destination = destination.into();
        let parent = destination.parent().ok_or_else(|| {
            Error::cache(
                format!("{} has no parent directory", destination.display()),
                io::Error::from(io::ErrorKind::InvalidInput),
            )
        })?;

        let temp = tempfile::Builder::new()
            .suffix(".scratch")
            .tempfile_in(parent)
            .map_err(|e| {
                Error::cache(
                    format!("cannot create scratch file for {}", destination.display()),
                    e,
                )
            })?
            .into_temp_path();

        Ok(Self { temp, destination })
    }

    /// The path to write in-progress content to.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// The file this scratch will eventually replace.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Atomically promote the scratch file over the destination.
    pub fn commit(self) -> Result<()> {
        let destination = self.destination;
        self.temp.persist(&destination).map_err(|e| {
            Error::cache(
                format!("cannot replace {}", destination.display()),
                e.error,
            )
        })?;
        Ok(())
    }
}

/// Create every missing directory up to `path`.
pub fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| Error::cache(format!("cannot create directory {}", path.display()), e))
}

/// Try to delete a file, ignoring any errors.
pub fn try_delete(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path)?;
    serde_json::from_reader(io::BufReader::new(file))
        .map_err(|e| Error::malformed(path, e.to_string()))
}

fn sha1_sidecar(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".sha1");
    path.with_file_name(name)
}

/// Get the SHA-1 of an immutable file, reading the `.sha1` sidecar when
/// present and computing (then caching) it otherwise.
///
/// The sidecar follows the maven repository convention of storing a file's
/// checksum next to it. It is only trustworthy for files that are replaced
/// atomically and never edited in place, which holds for everything this
/// crate writes.
pub fn get_sha1(path: &Path) -> io::Result<String> {
    let sidecar = sha1_sidecar(path);
    if let Ok(cached) = fs::read_to_string(&sidecar) {
        let cached = cached.trim();
        if !cached.is_empty() {
            return Ok(cached.to_string());
        }
    }

    let sha = hash::hash_file(HashAlgorithm::Sha1, path)?;
    set_sha1(path, &sha);
    Ok(sha)
}

/// Get the SHA-1 of a file, or `None` if it cannot be read.
pub fn try_get_sha1(path: &Path) -> Option<String> {
    get_sha1(path).ok()
}

/// Store a file's SHA-1 in its sidecar. Failure is not correctness-critical.
pub fn set_sha1(path: &Path, sha: &str) {
    let sidecar = sha1_sidecar(path);
    if fs::write(&sidecar, sha).is_err() {
        warn!("cannot cache hash for {}", path.display());
    }
}

/// Recompute and store the SHA-1 sidecar for a freshly written file.
pub fn update_sha1(path: &Path) -> io::Result<()> {
    let sha = hash::hash_file(HashAlgorithm::Sha1, path)?;
    set_sha1(path, &sha);
    Ok(())
}
