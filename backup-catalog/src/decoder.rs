//! Decodes cached manifest files into [`Manifest`]s.

use crate::extract::Extractor;
use crate::manifest::Manifest;
use crate::utils::{CatalogError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Upper bound on a decoded manifest payload.
pub const MAX_MANIFEST_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct ManifestDecoder {
    extractor: Arc<dyn Extractor>,
}

impl ManifestDecoder {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }

    /// Decode the manifest cached at `path`.
    ///
    /// Returns `ExtractionFailure` when the payload cannot be read (missing,
    /// corrupt or truncated file) and `MalformedManifest` when it is not a
    /// valid manifest record.
    pub async fn decode(&self, path: &Path) -> Result<Manifest> {
        let payload = {
            let reader = self.extractor.open(path).await?;
            let mut limited = reader.take(MAX_MANIFEST_BYTES + 1);
            let mut payload = Vec::new();
            limited
                .read_to_end(&mut payload)
                .await
                .map_err(|e| CatalogError::ExtractionFailure {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            payload
        };

        if payload.len() as u64 > MAX_MANIFEST_BYTES {
            return Err(CatalogError::ExtractionFailure {
                path: path.to_path_buf(),
                reason: format!("payload exceeds {} bytes", MAX_MANIFEST_BYTES),
            });
        }

        Manifest::from_slice(&payload).map_err(|e| CatalogError::MalformedManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
