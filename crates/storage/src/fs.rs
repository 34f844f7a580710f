//! Directory-backed store: `meta.txt`, `states.dat` and one file per
//! dictionary body, all in a single app-private directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use crate::index::CacheIndex;
use crate::repository::{
    DictionaryCache, SessionStateStore, Storage, StorageError, check_name,
};
use crate::{INDEX_FILE, STATES_FILE};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_optional(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.root.join(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a sibling temp file and rename, so readers never see a
    /// half-written file.
    async fn write_replace(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.root.join(name);
        let staging = self.root.join(format!(".{name}.tmp"));
        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &target).await?;
        Ok(())
    }
}

#[async_trait]
impl DictionaryCache for FileStore {
    async fn read_index(&self) -> Result<Option<CacheIndex>, StorageError> {
        let Some(bytes) = self.read_optional(INDEX_FILE).await? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        Ok(Some(CacheIndex::parse(&text)?))
    }

    async fn write_index(&self, index: &CacheIndex) -> Result<(), StorageError> {
        self.write_replace(INDEX_FILE, index.render().as_bytes())
            .await
    }

    async fn read_body(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        check_name(filename)?;
        self.read_optional(filename)
            .await?
            .ok_or_else(|| StorageError::NotFound(filename.to_owned()))
    }

    async fn write_body(&self, filename: &str, bytes: &[u8]) -> Result<(), StorageError> {
        check_name(filename)?;
        self.write_replace(filename, bytes).await
    }
}

#[async_trait]
impl SessionStateStore for FileStore {
    async fn read_states(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.read_optional(STATES_FILE).await
    }

    async fn write_states(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.write_replace(STATES_FILE, bytes).await
    }
}

impl Storage {
    /// Build a `Storage` backed by files under `root`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the directory cannot be created.
    pub async fn filesystem(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = FileStore::open(root).await?;
        let dictionaries: Arc<dyn DictionaryCache> = Arc::new(store.clone());
        let states: Arc<dyn SessionStateStore> = Arc::new(store);
        Ok(Self {
            dictionaries,
            states,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FileStore>();
    }

    #[tokio::test]
    async fn missing_files_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(store.read_index().await.unwrap().is_none());
        assert!(store.read_states().await.unwrap().is_none());
        assert!(matches!(
            store.read_body("x.dic").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn creates_nested_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        let store = FileStore::open(&root).await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn rejects_traversal_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            store.write_body("../escape", b"x").await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            store.read_body("meta.txt").await,
            Err(StorageError::InvalidName(_))
        ));
    }
}
