//! Input materialisation: fetched bytes → a local scratch file.
//!
//! ffmpeg and ffprobe need a file-system path. [`Materializer::materialize`]
//! fetches a URL (through the memoising fetcher), writes the bytes to a
//! uniquely named `edgequake-*.in` file and hands back a [`MaterializedFile`]
//! guard that owns that file.
//!
//! When the guard drops it either deletes the file and invalidates every
//! cache entry derived from it, or, when retention was requested, records
//! the path so the next call for the same URL reuses it instead of
//! downloading again. A retained file is deleted once its cache entry is
//! evicted by capacity or TTL.

use crate::cache::PipelineCaches;
use crate::error::{ExtractError, Result};
use crate::fetch::{CachedFetcher, Fetcher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Writes fetched media to scratch files.
pub struct Materializer {
    fetcher: Arc<CachedFetcher>,
    caches: Arc<PipelineCaches>,
}

impl Materializer {
    pub fn new(fetcher: Arc<CachedFetcher>, caches: Arc<PipelineCaches>) -> Self {
        Self { fetcher, caches }
    }

    /// Fetch `url` and persist it. With `retain = true` the file survives the
    /// guard and is reused by later calls for the same URL.
    pub fn materialize(&self, url: &str, retain: bool) -> Result<MaterializedFile> {
        if let Some(path) = self.caches.retained.get(&url.to_string()) {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    debug!("Reusing retained input {} for {}", path.display(), url);
                    return Ok(self.guard(url, path, bytes, retain));
                }
                Err(e) => {
                    debug!("Retained input {} unusable ({}), refetching", path.display(), e);
                    self.caches.retained.invalidate(&url.to_string());
                }
            }
        }

        let fetched = self.fetcher.fetch(url)?;
        let path = write_scratch(&fetched.bytes)?;
        info!("Materialised {} ({} bytes) to {}", url, fetched.bytes.len(), path.display());

        Ok(MaterializedFile {
            url: url.to_string(),
            path,
            bytes: fetched.bytes,
            retain,
            caches: Arc::clone(&self.caches),
        })
    }

    fn guard(&self, url: &str, path: PathBuf, bytes: Vec<u8>, retain: bool) -> MaterializedFile {
        MaterializedFile {
            url: url.to_string(),
            path,
            bytes: Arc::new(bytes),
            retain,
            caches: Arc::clone(&self.caches),
        }
    }
}

/// Write `bytes` to a fresh `edgequake-*.in` file that outlives its handle.
fn write_scratch(bytes: &[u8]) -> Result<PathBuf> {
    let tmp_dir = std::env::temp_dir();
    let mut file = tempfile::Builder::new()
        .prefix("edgequake-")
        .suffix(".in")
        .tempfile()
        .map_err(|e| ExtractError::io(&tmp_dir, e))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ExtractError::io(file.path(), e))?;
    file.into_temp_path()
        .keep()
        .map_err(|e| ExtractError::io(&tmp_dir, e.error))
}

/// Scoped owner of one materialised input.
pub struct MaterializedFile {
    url: String,
    path: PathBuf,
    bytes: Arc<Vec<u8>>,
    retain: bool,
    caches: Arc<PipelineCaches>,
}

impl MaterializedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The original bytes, still available after the file is gone.
    pub fn bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }
}

impl Drop for MaterializedFile {
    fn drop(&mut self) {
        // The fetched bytes are not needed again either way: a retained file
        // is read back from disk.
        self.caches.fetch.invalidate(&self.url);

        if self.retain {
            self.caches
                .retained
                .insert(self.url.clone(), self.path.clone());
            debug!("Retaining {}", self.path.display());
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
        }
        self.caches.forget_path(&self.path);
        self.caches.forget_url(&self.url);
    }
}
