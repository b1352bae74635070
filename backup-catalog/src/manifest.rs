//! Manifest model for backup sets.
//!
//! A manifest describes one backup set written to a destination: the volume it
//! was taken from, the snapshot(s) it covers, and the archive parts that were
//! uploaded. Manifests are written by the backup pipeline as JSON with
//! PascalCase field names; this crate only ever reads them.

use crate::format::{format_bytes, format_duration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Decoded backup-set descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    /// Logical name of the backup set, never empty
    #[serde(deserialize_with = "non_empty_string")]
    pub volume_name: String,

    /// Snapshot this backup set was taken from
    pub base_snapshot: SnapshotInfo,

    /// Source snapshot for incremental sends (absent or unnamed for full sends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental_snapshot: Option<SnapshotInfo>,

    #[serde(default)]
    pub intermediary_incremental: bool,

    #[serde(default)]
    pub replication: bool,

    /// Destinations this manifest was written to; the first one is the primary
    #[serde(default)]
    pub destinations: Vec<String>,

    /// Archive parts uploaded for this backup set
    #[serde(default)]
    pub volumes: Vec<ArchiveVolume>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressor: Option<String>,

    /// Fields written by the pipeline that this crate does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Snapshot name and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SnapshotInfo {
    #[serde(default)]
    pub name: String,

    pub creation_time: DateTime<Utc>,
}

/// One uploaded archive part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveVolume {
    #[serde(default)]
    pub object_name: String,

    /// Bytes stored at the destination (after compression)
    #[serde(default)]
    pub size: u64,

    /// Bytes of the stream before compression
    #[serde(default)]
    pub raw_size: u64,
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.trim().is_empty() {
        return Err(serde::de::Error::custom("volume name must not be empty"));
    }
    Ok(value)
}

impl Manifest {
    /// Parse a manifest from its JSON payload.
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Primary destination, used to pick the backend for follow-up operations.
    pub fn primary_destination(&self) -> Option<&str> {
        self.destinations.first().map(String::as_str)
    }

    /// Incremental source snapshot, if this is an incremental backup set.
    pub fn incremental_from(&self) -> Option<&SnapshotInfo> {
        self.incremental_snapshot
            .as_ref()
            .filter(|snapshot| !snapshot.name.is_empty())
    }

    /// (compressed, raw) byte totals across all archive parts, capped at `u64::MAX`.
    pub fn total_bytes(&self) -> (u64, u64) {
        self.volumes.iter().fold((0, 0), |(stored, raw), volume| {
            (
                stored.saturating_add(volume.size),
                raw.saturating_add(volume.raw_size),
            )
        })
    }

    /// Inventory order: volume name, then base snapshot creation time.
    pub fn inventory_cmp(&self, other: &Self) -> Ordering {
        self.volume_name
            .cmp(&other.volume_name)
            .then_with(|| {
                self.base_snapshot
                    .creation_time
                    .cmp(&other.base_snapshot.creation_time)
            })
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Volume: {}", self.volume_name)?;
        writeln!(
            f,
            "\tSnapshot: {} ({})",
            self.base_snapshot.name, self.base_snapshot.creation_time
        )?;
        if let Some(incremental) = self.incremental_from() {
            writeln!(
                f,
                "\tIncremental From Snapshot: {} ({})",
                incremental.name, incremental.creation_time
            )?;
            writeln!(f, "\tIntermediary: {}", self.intermediary_incremental)?;
        }
        writeln!(f, "\tReplication: {}", self.replication)?;
        if let Some(compressor) = &self.compressor {
            writeln!(f, "\tCompressor: {}", compressor)?;
        }

        let (stored, raw) = self.total_bytes();
        writeln!(
            f,
            "\tArchives: {} - {} bytes ({})",
            self.volumes.len(),
            stored,
            format_bytes(stored)
        )?;
        writeln!(f, "\tVolume Size (Raw): {} bytes ({})", raw, format_bytes(raw))?;

        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => write!(
                f,
                "\tUploaded: {} (took {})",
                start,
                format_duration(end - start)
            ),
            (Some(start), None) => write!(f, "\tUploaded: {}", start),
            _ => write!(f, "\tUploaded: unknown"),
        }
    }
}
