//! Utility modules for the catalog.

pub mod errors;
pub mod logger;

pub use errors::{CatalogError, Result};
