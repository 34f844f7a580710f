//! Dictionary catalog synchronization: remote host, in-memory catalog and
//! on-device cache.

mod catalog;
mod manager;

pub use catalog::{CacheEntry, Catalog, CatalogItem};
pub use manager::{CatalogEvent, PersistReport, ReconcileOutcome, SyncManager};
