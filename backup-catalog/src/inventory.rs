//! Backup-set inventory for a destination.
//!
//! Ties together cache directory resolution, the destination backend, cache
//! synchronization and report building. This is the surface the CLI calls.

use crate::backend::{Backend, BackendOpener, FsBackendOpener};
use crate::cache::{CacheDirResolver, CacheSynchronizer, DefaultCacheDirResolver, SyncOutcome};
use crate::config::Config;
use crate::decoder::ManifestDecoder;
use crate::extract::{DefaultExtractor, Extractor};
use crate::report::{Report, ReportBuilder};
use crate::utils::{CatalogError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result of removing orphaned manifests from a cache.
#[derive(Debug, Default)]
pub struct CleanOutcome {
    pub removed: Vec<String>,
    pub failed: Vec<(String, std::io::Error)>,
}

pub struct Inventory {
    resolver: Arc<dyn CacheDirResolver>,
    opener: Arc<dyn BackendOpener>,
    synchronizer: CacheSynchronizer,
    reports: ReportBuilder,
}

impl Inventory {
    pub fn new(
        resolver: Arc<dyn CacheDirResolver>,
        opener: Arc<dyn BackendOpener>,
        extractor: Arc<dyn Extractor>,
        config: &Config,
    ) -> Self {
        Self {
            resolver,
            opener,
            synchronizer: CacheSynchronizer::new(
                config.sync.manifest_prefix.clone(),
                config.sync.max_concurrent_fetches,
            ),
            reports: ReportBuilder::new(
                ManifestDecoder::new(extractor),
                config.sync.max_concurrent_decodes,
            ),
        }
    }

    /// Inventory using filesystem destinations and the configured cache location.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(DefaultCacheDirResolver::new(config.cache.working_dir.clone())),
            Arc::new(FsBackendOpener),
            Arc::new(DefaultExtractor),
            config,
        )
    }

    /// Synchronize the cache for `destination` and describe its backup sets.
    pub async fn list_backup_sets(
        &self,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let (backend, cache_dir) = self.prepare(destination).await?;

        let result = self.sync_and_report(&backend, &cache_dir, cancel).await;
        close_backend(backend.as_ref(), destination).await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                error!("Could not list backup sets for target {}: {}", destination, e);
                return Err(e);
            }
        };

        if let Some(warning) = &report.warning {
            info!("{}", warning);
        }
        info!(
            "Listed {} backup sets for {} ({} local only)",
            report.backup_sets, destination, report.orphaned
        );
        Ok(report)
    }

    /// Synchronize the cache for `destination` and delete its orphaned manifests.
    pub async fn clean_orphans(
        &self,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<CleanOutcome> {
        let (backend, cache_dir) = self.prepare(destination).await?;

        let synced = self
            .synchronizer
            .synchronize(Arc::clone(&backend), &cache_dir, cancel)
            .await;
        close_backend(backend.as_ref(), destination).await;
        let outcome = synced?;

        let mut clean = CleanOutcome::default();
        for name in &outcome.orphaned {
            if cancel.is_cancelled() {
                return Err(CatalogError::Cancelled);
            }
            let path = cache_dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!("Removed local only manifest {}", path.display());
                    clean.removed.push(name.clone());
                }
                Err(e) => {
                    warn!("Could not remove local only manifest {}: {}", path.display(), e);
                    clean.failed.push((name.clone(), e));
                }
            }
        }
        Ok(clean)
    }

    async fn prepare(&self, destination: &str) -> Result<(Arc<dyn Backend>, PathBuf)> {
        let cache_dir = self.resolver.resolve(destination).map_err(|e| {
            error!("Could not get cache dir for target {}: {}", destination, e);
            e
        })?;
        let backend = self.opener.open(destination).await.map_err(|e| {
            error!("Could not initialize backend for target {}: {}", destination, e);
            e
        })?;
        Ok((backend, cache_dir))
    }

    async fn sync_and_report(
        &self,
        backend: &Arc<dyn Backend>,
        cache_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let outcome: SyncOutcome = self
            .synchronizer
            .synchronize(Arc::clone(backend), cache_dir, cancel)
            .await?;

        self.reports
            .build_report(
                &outcome.verified_paths(cache_dir),
                &outcome.orphaned_paths(cache_dir),
                cancel,
            )
            .await
    }
}

async fn close_backend(backend: &dyn Backend, destination: &str) {
    if let Err(e) = backend.close().await {
        warn!("Could not close backend for target {}: {}", destination, e);
    }
}
