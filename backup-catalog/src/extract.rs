//! Turns raw cache files into readable manifest payloads.
//!
//! Cache files hold manifests exactly as they were stored at the destination,
//! which may be compressed. Extractors undo that before the payload is parsed.

use crate::utils::{CatalogError, Result};
use async_compression::tokio::bufread::ZstdDecoder;
use async_trait::async_trait;
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Readable manifest payload.
pub type PayloadReader = Pin<Box<dyn AsyncRead + Send>>;

/// Frame magic of a zstd stream.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Open the payload stored in the cache file at `path`.
    async fn open(&self, path: &Path) -> Result<PayloadReader>;
}

/// Reads plain files and transparently decompresses zstd-compressed ones.
#[derive(Debug, Clone, Default)]
pub struct DefaultExtractor;

fn extraction_failure(path: &Path, reason: impl ToString) -> CatalogError {
    CatalogError::ExtractionFailure {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl Extractor for DefaultExtractor {
    async fn open(&self, path: &Path) -> Result<PayloadReader> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| extraction_failure(path, e))?;
        let mut reader = BufReader::new(file);

        let compressed = reader
            .fill_buf()
            .await
            .map_err(|e| extraction_failure(path, e))?
            .starts_with(&ZSTD_MAGIC);

        if compressed {
            let mut decoder = ZstdDecoder::new(reader);
            decoder.multiple_members(true);
            Ok(Box::pin(decoder))
        } else {
            Ok(Box::pin(reader))
        }
    }
}
