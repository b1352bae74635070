//! End-to-end listing scenarios against in-memory and filesystem destinations.

use backup_catalog::backend::{FsBackendOpener, MemoryBackend};
use backup_catalog::cache::{CacheDirResolver, CacheSynchronizer, DefaultCacheDirResolver};
use backup_catalog::extract::DefaultExtractor;
use backup_catalog::{CatalogError, Config, Inventory};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct FixedDir(PathBuf);

impl CacheDirResolver for FixedDir {
    fn resolve(&self, _destination: &str) -> backup_catalog::Result<PathBuf> {
        Ok(self.0.clone())
    }
}

fn manifest(volume: &str, snapshot: &str, created: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "VolumeName": volume,
        "BaseSnapshot": {"Name": snapshot, "CreationTime": created},
        "Destinations": ["mem://primary"],
        "Volumes": [{"ObjectName": format!("{}|{}.vol1", volume, snapshot), "Size": 2048, "RawSize": 8192}],
    }))
    .unwrap()
}

fn memory_inventory(backend: &Arc<MemoryBackend>, cache: &TempDir) -> Inventory {
    Inventory::new(
        Arc::new(FixedDir(cache.path().to_path_buf())),
        Arc::new(Arc::clone(backend)),
        Arc::new(DefaultExtractor),
        &Config::default(),
    )
}

fn names(set: &BTreeSet<String>) -> Vec<&str> {
    set.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn lists_fetched_manifests_in_creation_order() {
    let backend = Arc::new(MemoryBackend::new());
    // Key order is the reverse of creation order.
    backend.insert("manifests|a", manifest("vol-a", "m2-snap", "2024-05-02T00:00:00Z"));
    backend.insert("manifests|b", manifest("vol-a", "m1-snap", "2024-05-01T00:00:00Z"));
    let cache = TempDir::new().unwrap();

    let report = memory_inventory(&backend, &cache)
        .list_backup_sets("mem://primary", &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.summary.starts_with("Found 2 backup sets"));
    let m1 = report.summary.find("m1-snap").unwrap();
    let m2 = report.summary.find("m2-snap").unwrap();
    assert!(m1 < m2);
    assert!(report.warning.is_none());
    assert_eq!(backend.fetch_count(), 2);
    assert!(cache.path().join("manifests|a").is_file());
    assert!(cache.path().join("manifests|b").is_file());
}

#[tokio::test]
async fn stale_local_manifest_is_reported_as_orphan() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = TempDir::new().unwrap();
    std::fs::write(
        cache.path().join("stale.json"),
        manifest("vol-old", "forgotten", "2022-01-01T00:00:00Z"),
    )
    .unwrap();

    let report = memory_inventory(&backend, &cache)
        .list_backup_sets("mem://primary", &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.summary.starts_with("Found 0 backup sets"));
    assert_eq!(report.orphaned, 1);
    let warning = report.warning.unwrap();
    assert!(warning.contains("There are 1 manifests found locally"));
    assert!(warning.contains("Volume: vol-old"));
    assert!(warning.contains("forgotten"));
}

#[tokio::test]
async fn undecodable_orphan_still_counted() {
    let backend = Arc::new(MemoryBackend::new());
    let cache = TempDir::new().unwrap();
    std::fs::write(cache.path().join("stale.json"), b"\x00\x01 not json").unwrap();

    let report = memory_inventory(&backend, &cache)
        .list_backup_sets("mem://primary", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.undecodable_orphans, 1);
    let warning = report.warning.unwrap();
    assert!(warning.starts_with("There are 1 manifests found locally"));
    assert!(warning.contains("1 manifests could not be decoded."));
    assert!(!warning.contains("Volume:"));
}

#[tokio::test]
async fn corrupt_verified_manifest_aborts_listing() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert("manifests|good", manifest("vol-a", "s1", "2024-01-01T00:00:00Z"));
    backend.insert("manifests|bad", b"{\"VolumeName\": \"vol-a\"".to_vec());
    let cache = TempDir::new().unwrap();

    let err = memory_inventory(&backend, &cache)
        .list_backup_sets("mem://primary", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::MalformedManifest { .. }));
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let backend = Arc::new(MemoryBackend::new());
    backend.fail_listing(true);
    let cache = TempDir::new().unwrap();

    let err = memory_inventory(&backend, &cache)
        .list_backup_sets("mem://primary", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CatalogError::BackendUnavailable { .. }));
}

#[tokio::test]
async fn sync_matches_set_difference_and_is_idempotent() {
    let backend = Arc::new(MemoryBackend::new());
    for key in ["manifests|1", "manifests|2", "manifests|3"] {
        backend.insert(key, manifest("vol", key, "2024-01-01T00:00:00Z"));
    }
    let cache = TempDir::new().unwrap();
    for name in ["manifests|2", "manifests|9", "other"] {
        std::fs::write(cache.path().join(name), b"{}").unwrap();
    }

    let sync = CacheSynchronizer::new("manifests", 2);
    let first = sync
        .synchronize(backend.clone(), cache.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&first.verified), vec!["manifests|1", "manifests|2", "manifests|3"]);
    assert_eq!(names(&first.orphaned), vec!["manifests|9", "other"]);
    assert_eq!(backend.fetch_count(), 2);
    for key in &first.verified {
        assert!(cache.path().join(key).is_file());
    }

    let second = sync
        .synchronize(backend.clone(), cache.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.verified, first.verified);
    assert_eq!(second.orphaned, first.orphaned);
    assert!(second.fetched.is_empty());
    assert_eq!(backend.fetch_count(), 2);
}

#[tokio::test]
async fn removed_remote_manifest_becomes_orphan() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert("manifests|keep", manifest("vol", "keep", "2024-01-01T00:00:00Z"));
    backend.insert("manifests|drop", manifest("vol", "drop", "2024-01-02T00:00:00Z"));
    let cache = TempDir::new().unwrap();
    let sync = CacheSynchronizer::new("manifests", 1);

    sync.synchronize(backend.clone(), cache.path(), &CancellationToken::new())
        .await
        .unwrap();
    backend.remove("manifests|drop");
    let outcome = sync
        .synchronize(backend.clone(), cache.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(names(&outcome.verified), vec!["manifests|keep"]);
    assert_eq!(names(&outcome.orphaned), vec!["manifests|drop"]);
}

#[tokio::test]
async fn cancellation_mid_fetch_returns_promptly_and_retry_converges() {
    let backend = Arc::new(MemoryBackend::new());
    backend.insert("manifests|fast", manifest("vol", "fast", "2024-01-01T00:00:00Z"));
    backend.insert("manifests|slow", manifest("vol", "slow", "2024-01-02T00:00:00Z"));
    backend.stall_fetch("manifests|slow");
    let cache = TempDir::new().unwrap();

    let inventory = Arc::new(memory_inventory(&backend, &cache));
    let cancel = CancellationToken::new();
    let task = {
        let inventory = Arc::clone(&inventory);
        let cancel = cancel.clone();
        tokio::spawn(async move { inventory.list_backup_sets("mem://primary", &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("cancelled listing should return promptly")
        .unwrap();
    assert!(matches!(result, Err(CatalogError::Cancelled)));
    assert!(!cache.path().join("manifests|slow").exists());

    backend.clear_faults();
    let report = inventory
        .list_backup_sets("mem://primary", &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.summary.starts_with("Found 2 backup sets"));
    assert!(report.warning.is_none());
}

#[tokio::test]
async fn filesystem_destination_with_compressed_manifest() {
    use async_compression::tokio::write::ZstdEncoder;
    use tokio::io::AsyncWriteExt;

    let destination = TempDir::new().unwrap();
    let working = TempDir::new().unwrap();

    let mut encoder = ZstdEncoder::new(Vec::new());
    encoder
        .write_all(&manifest("tank/data", "compressed-snap", "2024-03-01T00:00:00Z"))
        .await
        .unwrap();
    encoder.shutdown().await.unwrap();
    std::fs::write(
        destination.path().join("manifests|tank-data|compressed-snap"),
        encoder.into_inner(),
    )
    .unwrap();
    std::fs::write(
        destination.path().join("manifests|tank-data|plain-snap"),
        manifest("tank/data", "plain-snap", "2024-02-01T00:00:00Z"),
    )
    .unwrap();
    std::fs::write(destination.path().join("tank-data|plain-snap.vol1"), b"payload").unwrap();

    let uri = format!("file://{}", destination.path().display());
    let inventory = Inventory::new(
        Arc::new(DefaultCacheDirResolver::new(working.path())),
        Arc::new(FsBackendOpener),
        Arc::new(DefaultExtractor),
        &Config::default(),
    );

    let report = inventory
        .list_backup_sets(&uri, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.summary.starts_with("Found 2 backup sets"));
    let plain = report.summary.find("plain-snap").unwrap();
    let compressed = report.summary.find("compressed-snap").unwrap();
    assert!(plain < compressed);

    let cache_dir = DefaultCacheDirResolver::new(working.path()).cache_path(&uri);
    assert!(cache_dir.join("manifests|tank-data|compressed-snap").is_file());
    assert!(!cache_dir.join("tank-data|plain-snap.vol1").exists());
}

#[tokio::test]
async fn unsupported_destination_scheme_is_unavailable() {
    let working = TempDir::new().unwrap();
    let inventory = Inventory::new(
        Arc::new(DefaultCacheDirResolver::new(working.path())),
        Arc::new(FsBackendOpener),
        Arc::new(DefaultExtractor),
        &Config::default(),
    );

    let err = inventory
        .list_backup_sets("s3://bucket/prefix", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::BackendUnavailable { .. }));
}
