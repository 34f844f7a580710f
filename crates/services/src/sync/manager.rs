use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use drill_core::model::Version;
use storage::index::CacheIndex;
use storage::repository::{DictionaryCache, StorageError};

use crate::error::ReconcileError;
use crate::remote::RemoteCatalog;
use crate::sync::catalog::{CacheEntry, Catalog};

const EVENT_CAPACITY: usize = 16;

/// How a reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Manifest fetched; catalog rebuilt from it.
    UpdatedFromNetwork,
    /// Network failed; the catalog already loaded stays in place.
    KeptExisting,
    /// Network failed; catalog read from the device.
    LoadedFromDevice,
    /// Nothing could be loaded.
    Unavailable,
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::UpdatedFromNetwork => "Dictionaries Updated from the Internet",
            Self::KeptExisting | Self::Unavailable => {
                "Internet Connection not Available, Dictionaries not Updated"
            }
            Self::LoadedFromDevice => {
                "Internet Connection not Available, Dictionaries Loaded from the Device"
            }
        };
        f.write_str(message)
    }
}

/// Raised once per reconciliation, after the catalog is final.
#[derive(Debug, Clone)]
pub struct CatalogEvent {
    pub outcome: ReconcileOutcome,
    pub catalog: Arc<Catalog>,
    pub available: bool,
}

/// Counts from one `persist_to_local` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub written: usize,
    pub up_to_date: usize,
    pub failed: usize,
}

struct CatalogState {
    catalog: Arc<Catalog>,
    available: bool,
}

/// Keeps the dictionary catalog in step with the remote host and the device.
pub struct SyncManager {
    remote: Arc<dyn RemoteCatalog>,
    cache: Arc<dyn DictionaryCache>,
    state: RwLock<CatalogState>,
    reconciling: Mutex<()>,
    persisting: Mutex<()>,
    events: broadcast::Sender<CatalogEvent>,
    persist_after_update: bool,
}

impl SyncManager {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteCatalog>, cache: Arc<dyn DictionaryCache>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            remote,
            cache,
            state: RwLock::new(CatalogState {
                catalog: Arc::new(Catalog::new()),
                available: false,
            }),
            reconciling: Mutex::new(()),
            persisting: Mutex::new(()),
            events,
            persist_after_update: false,
        }
    }

    /// Write downloaded dictionaries to the device after each network update.
    #[must_use]
    pub fn with_persist_after_update(mut self, enabled: bool) -> Self {
        self.persist_after_update = enabled;
        self
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    /// Current catalog. Never blocks on a running reconciliation.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Catalog> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state.catalog)
    }

    /// Whether any tier has ever produced a catalog.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .available
    }

    /// Run [`SyncManager::reconcile`] on the runtime and return its handle.
    pub fn spawn_reconcile(self: &Arc<Self>) -> JoinHandle<ReconcileOutcome> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.reconcile().await })
    }

    /// Refresh the catalog: remote first, then the loaded catalog, then the
    /// device. Requests queue behind one another; each raises one event.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let _running = self.reconciling.lock().await;

        let outcome = match self.load_remote().await {
            Ok(catalog) => {
                self.publish(catalog);
                ReconcileOutcome::UpdatedFromNetwork
            }
            Err(err) => {
                warn!(error = %err, "remote catalog unavailable");
                if self.is_available() {
                    ReconcileOutcome::KeptExisting
                } else {
                    match self.load_local().await {
                        Ok(catalog) => {
                            self.publish(catalog);
                            ReconcileOutcome::LoadedFromDevice
                        }
                        Err(err) => {
                            warn!(error = %err, "no usable dictionaries on device");
                            ReconcileOutcome::Unavailable
                        }
                    }
                }
            }
        };

        let catalog = self.snapshot();
        info!(
            outcome = ?outcome,
            dictionaries = catalog.len(),
            "{outcome}"
        );
        // No subscribers is fine.
        let _ = self.events.send(CatalogEvent {
            outcome,
            catalog,
            available: self.is_available(),
        });

        if outcome == ReconcileOutcome::UpdatedFromNetwork && self.persist_after_update {
            match self.persist_to_local().await {
                Ok(report) => debug!(?report, "persisted catalog to device"),
                Err(err) => warn!(error = %err, "could not persist catalog to device"),
            }
        }

        outcome
    }

    /// Save every catalog entry the device does not already hold at an equal
    /// or newer version, then rewrite the index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the index cannot be read or written.
    /// Individual body failures are logged and counted, not returned. A
    /// corrupt index is replaced: every entry is rewritten under a new one.
    pub async fn persist_to_local(&self) -> Result<PersistReport, StorageError> {
        let _running = self.persisting.lock().await;
        let catalog = self.snapshot();
        let (mut index, replacing) = match self.cache.read_index().await {
            Ok(index) => (index.unwrap_or_default(), false),
            Err(StorageError::Index(err)) => {
                warn!(error = %err, "device index corrupt, rebuilding it");
                (CacheIndex::new(), true)
            }
            Err(err) => return Err(err),
        };
        let mut report = PersistReport::default();

        for entry in catalog.iter() {
            if index.is_current(entry.filename(), entry.version()) {
                report.up_to_date += 1;
                continue;
            }
            match self.cache.write_body(entry.filename(), entry.body()).await {
                Ok(()) => {
                    index.upsert(entry.filename(), entry.version());
                    report.written += 1;
                }
                Err(err) => {
                    warn!(filename = entry.filename(), error = %err, "could not save dictionary");
                    report.failed += 1;
                }
            }
        }

        if report.written > 0 || replacing {
            self.cache.write_index(&index).await?;
        }
        Ok(report)
    }

    fn publish(&self, catalog: Catalog) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = CatalogState {
            catalog: Arc::new(catalog),
            available: true,
        };
    }

    async fn load_remote(&self) -> Result<Catalog, ReconcileError> {
        let manifest = self.remote.fetch_manifest().await?;
        let current = self.snapshot();
        let device = self.device_index().await;
        let mut next = Catalog::new();

        for item in manifest.iter() {
            if let Some(existing) = current.get(&item.filename) {
                if existing.version() >= item.version {
                    next.insert(existing.clone());
                    continue;
                }
            } else if let Some(entry) = self
                .load_current_from_device(&device, &item.filename, item.version)
                .await
            {
                next.insert(entry);
                continue;
            }

            match self.download(&item.filename, item.version).await {
                Ok(entry) => next.insert(entry),
                Err(err) => {
                    warn!(filename = %item.filename, error = %err, "skipping dictionary");
                }
            }
        }

        Ok(next)
    }

    async fn download(&self, filename: &str, version: Version) -> Result<CacheEntry, ReconcileError> {
        let body = self.remote.fetch_body(filename).await?;
        CacheEntry::from_body(filename, version, body).map_err(|source| ReconcileError::Body {
            filename: filename.to_owned(),
            source,
        })
    }

    async fn device_index(&self) -> CacheIndex {
        match self.cache.read_index().await {
            Ok(index) => index.unwrap_or_default(),
            Err(err) => {
                debug!(error = %err, "ignoring unreadable device index");
                CacheIndex::new()
            }
        }
    }

    /// A body already on the device at `version` or newer, if it still decodes.
    async fn load_current_from_device(
        &self,
        device: &CacheIndex,
        filename: &str,
        version: Version,
    ) -> Option<CacheEntry> {
        let stored = device.get(filename).filter(|&stored| stored >= version)?;
        let body = self.cache.read_body(filename).await.ok()?;
        match CacheEntry::from_body(filename, stored, body) {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(filename, error = %err, "device copy unreadable, downloading");
                None
            }
        }
    }

    async fn load_local(&self) -> Result<Catalog, ReconcileError> {
        let index = self
            .cache
            .read_index()
            .await?
            .ok_or(ReconcileError::NothingSaved)?;

        let mut catalog = Catalog::new();
        for item in index.iter() {
            let body = self.cache.read_body(&item.filename).await?;
            let entry = CacheEntry::from_body(&item.filename, item.version, body).map_err(
                |source| ReconcileError::Body {
                    filename: item.filename.clone(),
                    source,
                },
            )?;
            catalog.insert(entry);
        }
        Ok(catalog)
    }
}
