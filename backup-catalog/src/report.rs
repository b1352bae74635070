//! Builds the backup-set inventory from cached manifests.
//!
//! Verified manifests must all decode: the inventory is either complete or not
//! produced. Orphaned manifests are described best-effort in a separate
//! warning, skipping any that fail to decode.

use crate::decoder::ManifestDecoder;
use crate::manifest::Manifest;
use crate::utils::{CatalogError, Result};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Rendered inventory.
#[derive(Debug, Clone)]
pub struct Report {
    /// Backup sets at the destination, sorted by volume and creation time
    pub summary: String,

    /// Present only when the cache holds manifests the destination does not
    pub warning: Option<String>,

    pub backup_sets: usize,
    pub orphaned: usize,
    pub undecodable_orphans: usize,
}

pub struct ReportBuilder {
    decoder: ManifestDecoder,
    max_concurrent_decodes: usize,
}

impl ReportBuilder {
    pub fn new(decoder: ManifestDecoder, max_concurrent_decodes: usize) -> Self {
        Self {
            decoder,
            max_concurrent_decodes: max_concurrent_decodes.max(1),
        }
    }

    pub async fn build_report(
        &self,
        verified_paths: &[PathBuf],
        orphaned_paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let mut manifests = Vec::with_capacity(verified_paths.len());
        for (path, decoded) in verified_paths
            .iter()
            .zip(self.decode_all(verified_paths, cancel).await?)
        {
            match decoded {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => {
                    error!("Could not read manifest {}: {}", path.display(), e);
                    return Err(e);
                }
            }
        }

        // Stable: equal keys keep discovery order.
        manifests.sort_by(Manifest::inventory_cmp);
        let summary = render_summary(&manifests);

        let mut report = Report {
            summary,
            warning: None,
            backup_sets: manifests.len(),
            orphaned: orphaned_paths.len(),
            undecodable_orphans: 0,
        };

        if orphaned_paths.is_empty() {
            return Ok(report);
        }

        let mut descriptions = Vec::with_capacity(orphaned_paths.len());
        for (path, decoded) in orphaned_paths
            .iter()
            .zip(self.decode_all(orphaned_paths, cancel).await?)
        {
            match decoded {
                Ok(manifest) => descriptions.push(manifest),
                Err(e) => {
                    warn!("Could not read local only manifest {}: {}", path.display(), e);
                    report.undecodable_orphans += 1;
                }
            }
        }

        report.warning = Some(render_warning(
            orphaned_paths.len(),
            &descriptions,
            report.undecodable_orphans,
        ));
        Ok(report)
    }

    /// Decode `paths` concurrently, returning results in input order.
    async fn decode_all(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<Manifest>>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_decodes));
        let mut handles = Vec::with_capacity(paths.len());

        for path in paths {
            let sem = Arc::clone(&semaphore);
            let decoder = self.decoder.clone();
            let cancel = cancel.clone();
            let path = path.clone();

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    permit = sem.acquire_owned() => permit.map_err(|e| CatalogError::ExtractionFailure {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?,
                    _ = cancel.cancelled() => return Err(CatalogError::Cancelled),
                };
                tokio::select! {
                    result = decoder.decode(&path) => result,
                    _ = cancel.cancelled() => Err(CatalogError::Cancelled),
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (path, handle) in paths.iter().zip(handles) {
            let result = handle.await.unwrap_or_else(|e| {
                Err(CatalogError::ExtractionFailure {
                    path: path.clone(),
                    reason: format!("decode task failed: {}", e),
                })
            });
            results.push(result);
        }

        if cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }
        Ok(results)
    }
}

fn render_summary(manifests: &[Manifest]) -> String {
    let mut out = format!("Found {} backup sets:\n", manifests.len());
    for manifest in manifests {
        let _ = write!(out, "\n{}\n", manifest);
    }
    out
}

fn render_warning(total: usize, decoded: &[Manifest], undecodable: usize) -> String {
    let mut out = format!(
        "There are {} manifests found locally that are not on the target destination.\n\
         The following manifests were found locally and can be removed using the clean command.\n",
        total
    );
    for manifest in decoded {
        let _ = write!(out, "\n{}\n", manifest);
    }
    if undecodable > 0 {
        let _ = write!(out, "\n{} manifests could not be decoded.\n", undecodable);
    }
    out
}
