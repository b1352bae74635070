//! Remote destinations holding backup manifests.
//!
//! The catalog only ever reads from a destination: it lists manifest keys and
//! fetches individual manifest objects. Connection handling belongs to the
//! backend implementation.

pub mod fs;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

use crate::utils::Result;
use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub use fs::{FsBackend, FsBackendOpener};
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryBackend;

/// Byte stream for one fetched object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Read-only view of a backup destination.
#[async_trait]
pub trait Backend: Send + Sync {
    /// List every object key under `prefix` in a single listing call.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Open a byte stream for the object stored under `key`.
    async fn fetch(&self, key: &str) -> Result<ObjectReader>;

    /// Release any resources held for this destination.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Builds a backend bound to one destination.
#[async_trait]
pub trait BackendOpener: Send + Sync {
    async fn open(&self, destination: &str) -> Result<Arc<dyn Backend>>;
}
