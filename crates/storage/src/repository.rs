use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::index::{CacheIndex, IndexError, is_valid_filename};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid dictionary filename: {0:?}")]
    InvalidName(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("malformed cache index: {0}")]
    Index(#[from] IndexError),
}

/// Local cache of dictionary bodies plus the index describing them.
#[async_trait]
pub trait DictionaryCache: Send + Sync {
    /// Read and parse the cache index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Index` if the index is malformed, or other
    /// storage errors. A missing index is `Ok(None)`.
    async fn read_index(&self) -> Result<Option<CacheIndex>, StorageError>;

    /// Replace the cache index.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the index cannot be written.
    async fn write_index(&self, index: &CacheIndex) -> Result<(), StorageError>;

    /// Fetch a stored dictionary body.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn read_body(&self, filename: &str) -> Result<Vec<u8>, StorageError>;

    /// Store a dictionary body under `filename`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidName` for unsafe names, or other storage errors.
    async fn write_body(&self, filename: &str, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Opaque persistence for the saved quiz progress image.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Read the saved image; `Ok(None)` when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the image exists but cannot be read.
    async fn read_states(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace the saved image.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the image cannot be written.
    async fn write_states(&self, bytes: &[u8]) -> Result<(), StorageError>;
}

pub(crate) fn check_name(filename: &str) -> Result<(), StorageError> {
    if is_valid_filename(filename) {
        Ok(())
    } else {
        Err(StorageError::InvalidName(filename.to_owned()))
    }
}

/// Simple in-memory store for testing and prototyping.
///
/// The index is kept as text so malformed content can be seeded.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    index: Arc<Mutex<Option<String>>>,
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    states: Arc<Mutex<Option<Vec<u8>>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the raw index text.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if the lock is poisoned.
    pub fn put_index_text(&self, text: impl Into<String>) -> Result<(), StorageError> {
        let mut guard = self
            .index
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        *guard = Some(text.into());
        Ok(())
    }

    /// Raw index text, if any was written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if the lock is poisoned.
    pub fn index_text(&self) -> Result<Option<String>, StorageError> {
        let guard = self
            .index
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(guard.clone())
    }

    /// Names of every stored body, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Backend` if the lock is poisoned.
    pub fn body_names(&self) -> Result<Vec<String>, StorageError> {
        let guard = self
            .bodies
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut names: Vec<_> = guard.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl DictionaryCache for InMemoryStore {
    async fn read_index(&self) -> Result<Option<CacheIndex>, StorageError> {
        let text = self.index_text()?;
        match text {
            Some(text) => Ok(Some(CacheIndex::parse(&text)?)),
            None => Ok(None),
        }
    }

    async fn write_index(&self, index: &CacheIndex) -> Result<(), StorageError> {
        self.put_index_text(index.render())
    }

    async fn read_body(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        let guard = self
            .bodies
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        guard
            .get(filename)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(filename.to_owned()))
    }

    async fn write_body(&self, filename: &str, bytes: &[u8]) -> Result<(), StorageError> {
        check_name(filename)?;
        let mut guard = self
            .bodies
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        guard.insert(filename.to_owned(), bytes.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SessionStateStore for InMemoryStore {
    async fn read_states(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let guard = self
            .states
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(guard.clone())
    }

    async fn write_states(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut guard = self
            .states
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        *guard = Some(bytes.to_vec());
        Ok(())
    }
}

/// Aggregates the dictionary cache and the progress store behind trait
/// objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub dictionaries: Arc<dyn DictionaryCache>,
    pub states: Arc<dyn SessionStateStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryStore::new())
    }

    /// Wrap an existing in-memory store, keeping a handle for inspection.
    #[must_use]
    pub fn from_in_memory(store: InMemoryStore) -> Self {
        let dictionaries: Arc<dyn DictionaryCache> = Arc::new(store.clone());
        let states: Arc<dyn SessionStateStore> = Arc::new(store);
        Self {
            dictionaries,
            states,
        }
    }
}
