use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use drill_core::model::{Dictionary, Version};
use storage::codec::{CodecError, decode_dictionary};

/// A loaded dictionary together with the filename and version it is known by.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    filename: String,
    version: Version,
    dictionary: Arc<Dictionary>,
    body: Arc<[u8]>,
}

impl CacheEntry {
    /// Decode `body` and pair it with its catalog key.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the body is not a valid dictionary.
    pub fn from_body(
        filename: impl Into<String>,
        version: Version,
        body: Vec<u8>,
    ) -> Result<Self, CodecError> {
        let dictionary = decode_dictionary(&body)?;
        Ok(Self {
            filename: filename.into(),
            version,
            dictionary: Arc::new(dictionary),
            body: body.into(),
        })
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Catalog version, which may differ from the version inside the body.
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Raw body bytes as received, for writing back to the device.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Summary row for listings.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogItem {
    pub filename: String,
    pub version: Version,
    pub name: String,
    pub author: String,
    pub created_on: DateTime<Utc>,
    pub entries: usize,
}

/// Ordered, filename-unique set of available dictionaries.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CacheEntry>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`, replacing any entry with the same filename in place.
    pub fn insert(&mut self, entry: CacheEntry) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.filename == entry.filename)
        {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    #[must_use]
    pub fn get(&self, filename: &str) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| e.filename == filename)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn listing(&self) -> Vec<CatalogItem> {
        self.entries
            .iter()
            .map(|e| CatalogItem {
                filename: e.filename.clone(),
                version: e.version,
                name: e.dictionary.name().to_owned(),
                author: e.dictionary.author().to_owned(),
                created_on: e.dictionary.created_on(),
                entries: e.dictionary.len(),
            })
            .collect()
    }
}

impl FromIterator<CacheEntry> for Catalog {
    fn from_iter<T: IntoIterator<Item = CacheEntry>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for entry in iter {
            catalog.insert(entry);
        }
        catalog
    }
}
