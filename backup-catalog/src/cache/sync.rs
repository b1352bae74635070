//! Reconciles a local manifest cache against the destination's listing.
//!
//! The destination is authoritative. Every manifest it lists is materialized
//! in the cache (downloading what is missing), and every cache entry it does
//! not list is reported as orphaned. Existing cache files are never modified
//! or removed here.

use super::{cache_file_name, list_cache_entries, PARTIAL_SUFFIX};
use crate::backend::Backend;
use crate::utils::{CatalogError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one synchronization pass.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Remote keys that are present in the cache after the pass
    pub verified: BTreeSet<String>,

    /// Cache file names with no counterpart at the destination
    pub orphaned: BTreeSet<String>,

    /// Keys downloaded during this pass
    pub fetched: Vec<String>,

    /// Keys that could not be materialized, with the reason
    pub failed: Vec<(String, CatalogError)>,
}

impl SyncOutcome {
    /// Cache paths of the verified manifests, in key order.
    pub fn verified_paths(&self, cache_dir: &Path) -> Vec<PathBuf> {
        self.verified
            .iter()
            .filter_map(|key| cache_file_name(key))
            .map(|name| cache_dir.join(name))
            .collect()
    }

    /// Cache paths of the orphaned manifests, in name order.
    pub fn orphaned_paths(&self, cache_dir: &Path) -> Vec<PathBuf> {
        self.orphaned.iter().map(|name| cache_dir.join(name)).collect()
    }
}

/// Brings a cache directory in line with a destination.
#[derive(Debug, Clone)]
pub struct CacheSynchronizer {
    manifest_prefix: String,
    max_concurrent_fetches: usize,
}

impl CacheSynchronizer {
    pub fn new(manifest_prefix: impl Into<String>, max_concurrent_fetches: usize) -> Self {
        Self {
            manifest_prefix: manifest_prefix.into(),
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    /// Run one synchronization pass.
    ///
    /// Fails as a whole only when the destination cannot be listed, the cache
    /// directory cannot be read, or `cancel` fires. Individual downloads that
    /// fail are recorded in [`SyncOutcome::failed`] and left out of
    /// [`SyncOutcome::verified`].
    pub async fn synchronize(
        &self,
        backend: Arc<dyn Backend>,
        cache_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }

        let listing = tokio::select! {
            result = backend.list(&self.manifest_prefix) => result,
            _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
        };
        let remote_keys: BTreeSet<String> = match listing {
            Ok(keys) => keys.into_iter().collect(),
            Err(e) => {
                error!("Could not list manifests at destination: {}", e);
                return Err(e);
            }
        };

        let local_names = list_cache_entries(cache_dir).await?;

        let mut outcome = SyncOutcome::default();

        // Cache file name -> remote key
        let mut remote_names = BTreeMap::new();
        for key in &remote_keys {
            match cache_file_name(key) {
                Some(name) => {
                    remote_names.insert(name, key.clone());
                }
                None => {
                    warn!("Manifest key '{}' cannot be stored in the cache, skipping", key);
                    outcome.failed.push((
                        key.clone(),
                        CatalogError::cache_write(key.as_str(), "key is not a valid cache file name"),
                    ));
                }
            }
        }

        outcome.orphaned = local_names
            .iter()
            .filter(|name| !remote_names.contains_key(*name))
            .cloned()
            .collect();

        let missing: Vec<(String, String)> = remote_names
            .iter()
            .filter(|(name, _)| !local_names.contains(*name))
            .map(|(name, key)| (name.clone(), key.clone()))
            .collect();

        info!(
            "Manifest cache sync: {} at destination, {} cached, {} to fetch, {} local only",
            remote_keys.len(),
            local_names.len(),
            missing.len(),
            outcome.orphaned.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_fetches));
        let mut handles = Vec::with_capacity(missing.len());

        for (name, key) in missing {
            let sem = Arc::clone(&semaphore);
            let backend = Arc::clone(&backend);
            let target = cache_dir.join(&name);
            let cancel = cancel.clone();

            let task_key = key.clone();
            let handle = tokio::spawn(async move {
                let permit = tokio::select! {
                    result = sem.acquire_owned() => result
                        .map_err(|e| CatalogError::cache_write(key.as_str(), e)),
                    _ = cancel.cancelled() => Err(CatalogError::Cancelled),
                };
                let result = match permit {
                    Ok(_permit) => fetch_to_cache(backend.as_ref(), &key, &target, &cancel).await,
                    Err(e) => Err(e),
                };
                (key, result)
            });
            handles.push((task_key, handle));
        }

        for (task_key, handle) in handles {
            match handle.await {
                Ok((key, Ok(()))) => {
                    debug!("Fetched manifest {}", key);
                    outcome.fetched.push(key);
                }
                Ok((_, Err(CatalogError::Cancelled))) => {}
                Ok((key, Err(e))) => {
                    warn!("Could not fetch manifest {}: {}", key, e);
                    outcome.failed.push((key, e));
                }
                Err(e) => {
                    error!("Manifest fetch task for {} failed: {}", task_key, e);
                    let reason = format!("fetch task failed: {}", e);
                    outcome
                        .failed
                        .push((task_key.clone(), CatalogError::cache_write(task_key, reason)));
                }
            }
        }

        if cancel.is_cancelled() {
            info!(
                "Manifest cache sync cancelled after fetching {} manifests",
                outcome.fetched.len()
            );
            return Err(CatalogError::Cancelled);
        }

        let fetched: BTreeSet<&String> = outcome.fetched.iter().collect();
        outcome.verified = remote_names
            .into_iter()
            .filter(|(name, key)| local_names.contains(name) || fetched.contains(key))
            .map(|(_, key)| key)
            .collect();

        info!(
            "Manifest cache synced: {} verified, {} fetched, {} failed, {} orphaned",
            outcome.verified.len(),
            outcome.fetched.len(),
            outcome.failed.len(),
            outcome.orphaned.len()
        );

        Ok(outcome)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

/// Download one object into the cache.
///
/// Bytes land in a `.partial` file that is renamed into place once complete,
/// so an interrupted download never looks like a cache entry. A cancelled
/// download leaves its partial file behind; the next pass overwrites it.
async fn fetch_to_cache(
    backend: &dyn Backend,
    key: &str,
    target: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let partial = partial_path(target);

    let transfer = async {
        let mut reader = backend.fetch(key).await?;
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| CatalogError::cache_write(key, e))?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| CatalogError::cache_write(key, format!("transfer interrupted: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| CatalogError::cache_write(key, e))?;
        file.sync_all()
            .await
            .map_err(|e| CatalogError::cache_write(key, e))?;
        drop(file);
        tokio::fs::rename(&partial, target)
            .await
            .map_err(|e| CatalogError::cache_write(key, e))?;
        Ok::<(), CatalogError>(())
    };

    let result = tokio::select! {
        result = transfer => result,
        _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
    };

    if result.is_err() {
        // Nothing to clean up when the fetch failed before the file was created.
        let _ = tokio::fs::remove_file(&partial).await;
    }
    result
}
