//! Local manifest cache.
//!
//! Each destination gets its own cache directory holding one file per
//! manifest object, named after the object key.

pub mod sync;

use crate::utils::{CatalogError, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;

pub use sync::{CacheSynchronizer, SyncOutcome};

/// Suffix for downloads that have not been completed yet.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Maps a destination to its local cache directory.
pub trait CacheDirResolver: Send + Sync {
    /// Return the cache directory for `destination`, creating it when needed.
    fn resolve(&self, destination: &str) -> Result<PathBuf>;
}

/// Places caches under `<working_dir>/cache/<sha256 of destination>`.
#[derive(Debug, Clone)]
pub struct DefaultCacheDirResolver {
    working_dir: PathBuf,
}

impl DefaultCacheDirResolver {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// Cache directory path for `destination`, without touching the filesystem.
    pub fn cache_path(&self, destination: &str) -> PathBuf {
        let digest = Sha256::digest(destination.as_bytes());
        self.working_dir.join("cache").join(hex::encode(digest))
    }
}

impl CacheDirResolver for DefaultCacheDirResolver {
    fn resolve(&self, destination: &str) -> Result<PathBuf> {
        let path = self.cache_path(destination);
        std::fs::create_dir_all(&path).map_err(|source| CatalogError::CacheDirUnavailable {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// File name used to cache the object stored under `key`.
///
/// Keys map to themselves unless they contain path separators, which are
/// percent-escaped (along with `%` itself) so the mapping stays one-to-one.
/// Returns `None` for keys that cannot name a complete cache entry.
pub fn cache_file_name(key: &str) -> Option<String> {
    if key.is_empty() || key == "." || key == ".." || key.ends_with(PARTIAL_SUFFIX) {
        return None;
    }
    let mut name = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            '\0' => name.push_str("%00"),
            _ => name.push(c),
        }
    }
    Some(name)
}

/// Names of the complete cache entries in `dir`.
///
/// Subdirectories and unfinished downloads are not cache entries.
pub async fn list_cache_entries(dir: &Path) -> Result<BTreeSet<String>> {
    let unavailable = |source: std::io::Error| CatalogError::CacheDirUnavailable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = BTreeSet::new();
    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(unavailable)?;
    while let Some(entry) = read_dir.next_entry().await.map_err(unavailable)? {
        if !entry.file_type().await.map_err(unavailable)?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().map(str::to_string) else {
            warn!(
                "Ignoring cache file with a non UTF-8 name: {}",
                file_name.to_string_lossy()
            );
            continue;
        };
        if name.ends_with(PARTIAL_SUFFIX) {
            continue;
        }
        entries.insert(name);
    }
    Ok(entries)
}
