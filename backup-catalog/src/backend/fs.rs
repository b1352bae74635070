//! Destination backed by a directory on a mounted filesystem.
//!
//! Accepts `file:///path` URIs and plain paths. Object keys are paths relative
//! to the destination root, with `/` as separator.

use super::{Backend, BackendOpener, ObjectReader};
use crate::utils::{CatalogError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

const FILE_SCHEME: &str = "file://";

/// Backend reading objects from a local directory tree.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(CatalogError::backend(key, "object key escapes destination root"));
        }
        Ok(self.root.join(relative))
    }
}

/// Walk the destination root and return relative keys of all regular files.
fn list_keys(root: &Path, prefix: &str) -> std::result::Result<Vec<String>, walkdir::Error> {
    let mut keys = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if key.starts_with(prefix) {
            keys.push(key);
        }
    }
    keys.sort();
    Ok(keys)
}

#[async_trait]
impl Backend for FsBackend {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.root.clone();
        let prefix_owned = prefix.to_string();
        let keys = tokio::task::spawn_blocking(move || list_keys(&root, &prefix_owned))
            .await
            .map_err(|e| CatalogError::backend(self.root.display().to_string(), e))?
            .map_err(|e| CatalogError::backend(self.root.display().to_string(), e))?;

        debug!(
            "Listed {} objects under '{}' in {}",
            keys.len(),
            prefix,
            self.root.display()
        );
        Ok(keys)
    }

    async fn fetch(&self, key: &str) -> Result<ObjectReader> {
        let path = self.object_path(key)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| CatalogError::backend(key, e))?;
        Ok(Box::pin(file))
    }
}

/// Opens [`FsBackend`]s for `file://` and plain-path destinations.
#[derive(Debug, Clone, Default)]
pub struct FsBackendOpener;

impl FsBackendOpener {
    /// Resolve a destination string to a local directory.
    pub fn parse_destination(destination: &str) -> Result<PathBuf> {
        if let Some(path) = destination.strip_prefix(FILE_SCHEME) {
            if path.is_empty() {
                return Err(CatalogError::backend(destination, "empty file:// path"));
            }
            return Ok(PathBuf::from(path));
        }
        if let Some((scheme, _)) = destination.split_once("://") {
            return Err(CatalogError::backend(
                destination,
                format!("unsupported destination scheme '{}'", scheme),
            ));
        }
        if destination.is_empty() {
            return Err(CatalogError::backend(destination, "empty destination"));
        }
        Ok(PathBuf::from(destination))
    }
}

#[async_trait]
impl BackendOpener for FsBackendOpener {
    async fn open(&self, destination: &str) -> Result<Arc<dyn Backend>> {
        let root = Self::parse_destination(destination)?;
        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| CatalogError::backend(destination, e))?;
        if !metadata.is_dir() {
            return Err(CatalogError::backend(destination, "destination is not a directory"));
        }
        let backend: Arc<dyn Backend> = Arc::new(FsBackend::new(root));
        Ok(backend)
    }
}
