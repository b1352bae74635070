//! Backup Catalog Library
//!
//! Keeps a local cache of backup-set manifests in line with a destination and
//! describes the backup sets found there.

pub mod backend;
pub mod cache;
pub mod config;
pub mod decoder;
pub mod extract;
pub mod format;
pub mod inventory;
pub mod manifest;
pub mod report;
pub mod shutdown;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use inventory::{CleanOutcome, Inventory};
pub use manifest::Manifest;
pub use report::Report;
pub use utils::errors::CatalogError;
pub type Result<T> = std::result::Result<T, CatalogError>;
