//! In-memory destination.
//!
//! Used as a substitute for remote destinations in tests. Besides storing
//! objects it counts fetches and can be told to fail, stall or panic on
//! specific operations. Only built for this crate's tests and behind the
//! `test-util` feature.

use super::{Backend, BackendOpener, ObjectReader};
use crate::utils::{CatalogError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_keys: Mutex<HashSet<String>>,
    stalled_keys: Mutex<HashSet<String>>,
    panicking_keys: Mutex<HashSet<String>>,
    listing_fails: AtomicBool,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, payload: impl Into<Vec<u8>>) {
        lock(&self.objects).insert(key.into(), payload.into());
    }

    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).remove(key)
    }

    /// Make every fetch of `key` fail.
    pub fn fail_fetch(&self, key: impl Into<String>) {
        lock(&self.failing_keys).insert(key.into());
    }

    /// Make every fetch of `key` hang until the caller gives up on it.
    pub fn stall_fetch(&self, key: impl Into<String>) {
        lock(&self.stalled_keys).insert(key.into());
    }

    /// Make every fetch of `key` panic inside the fetching task.
    pub fn panic_fetch(&self, key: impl Into<String>) {
        lock(&self.panicking_keys).insert(key.into());
    }

    pub fn clear_faults(&self) {
        lock(&self.failing_keys).clear();
        lock(&self.stalled_keys).clear();
        lock(&self.panicking_keys).clear();
        self.listing_fails.store(false, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.listing_fails.store(fail, Ordering::SeqCst);
    }

    /// Number of fetch calls that returned data.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(CatalogError::backend("memory", "listing failed"));
        }
        Ok(lock(&self.objects)
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn fetch(&self, key: &str) -> Result<ObjectReader> {
        let stalled = lock(&self.stalled_keys).contains(key);
        if stalled {
            return std::future::pending().await;
        }
        let panicking = lock(&self.panicking_keys).contains(key);
        if panicking {
            panic!("injected fetch panic for {}", key);
        }
        let failing = lock(&self.failing_keys).contains(key);
        if failing {
            return Err(CatalogError::backend(key, "injected fetch failure"));
        }
        let payload = lock(&self.objects)
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::backend(key, "no such object"))?;

        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(Cursor::new(payload)))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A shared in-memory backend opens to itself for any destination.
#[async_trait]
impl BackendOpener for Arc<MemoryBackend> {
    async fn open(&self, _destination: &str) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = self.clone();
        Ok(backend)
    }
}
