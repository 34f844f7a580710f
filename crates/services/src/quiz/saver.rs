//! Background writer for `states.dat`.
//!
//! The channel holds at most one pending request. A request that finds the
//! slot taken is dropped: the pending one snapshots the table when it runs,
//! so it already covers the newer state.

use std::sync::{Arc, PoisonError};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use storage::codec::{CodecError, StateRecord, encode_states};
use storage::repository::SessionStateStore;

use super::{SessionTable, SharedTable};
use crate::error::QuizServiceError;

enum SaveCommand {
    Save,
    Flush {
        respond: oneshot::Sender<Result<(), QuizServiceError>>,
    },
}

/// Cheaply cloneable handle to the save worker.
#[derive(Clone)]
pub(crate) struct SaveHandle {
    sender: mpsc::Sender<SaveCommand>,
}

impl SaveHandle {
    /// Spawn the worker on the current Tokio runtime.
    pub(crate) fn spawn(table: SharedTable, store: Arc<dyn SessionStateStore>) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        let worker = SaveWorker {
            receiver,
            table,
            store,
        };
        tokio::spawn(worker.run());
        Self { sender }
    }

    /// Ask for a save without waiting for it.
    pub(crate) fn request(&self) {
        match self.sender.try_send(SaveCommand::Save) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("save already pending, coalesced"),
            Err(TrySendError::Closed(_)) => warn!("save worker stopped, progress not saved"),
        }
    }

    /// Save the current state and wait for the write to finish.
    pub(crate) async fn flush(&self) -> Result<(), QuizServiceError> {
        let (respond, rx) = oneshot::channel();
        self.sender
            .send(SaveCommand::Flush { respond })
            .await
            .map_err(|_| QuizServiceError::SaveWorkerStopped)?;
        rx.await.map_err(|_| QuizServiceError::SaveWorkerStopped)?
    }
}

struct SaveWorker {
    receiver: mpsc::Receiver<SaveCommand>,
    table: SharedTable,
    store: Arc<dyn SessionStateStore>,
}

impl SaveWorker {
    async fn run(mut self) {
        debug!("save worker started");
        while let Some(command) = self.receiver.recv().await {
            match command {
                SaveCommand::Save => {
                    if let Err(err) = self.save().await {
                        warn!(error = %err, "could not save quiz progress");
                    }
                }
                SaveCommand::Flush { respond } => {
                    let _ = respond.send(self.save().await);
                }
            }
        }
        debug!("save worker stopped");
    }

    async fn save(&self) -> Result<(), QuizServiceError> {
        let Some(bytes) = self.snapshot()? else {
            debug!("saved progress not loaded yet, skipping save");
            return Ok(());
        };
        self.store.write_states(&bytes).await?;
        debug!(bytes = bytes.len(), "quiz progress saved");
        Ok(())
    }

    /// Encode under the lock; the write happens after it is released.
    fn snapshot(&self) -> Result<Option<Vec<u8>>, CodecError> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        encode_table(&table)
    }
}

/// `None` until saved progress has been loaded, so an early save cannot
/// overwrite it. Finished sessions are not written.
fn encode_table(table: &SessionTable) -> Result<Option<Vec<u8>>, CodecError> {
    if !table.loaded {
        return Ok(None);
    }
    let records: Vec<StateRecord<'_>> = table
        .sessions
        .iter()
        .filter(|(_, tracked)| !tracked.session.is_finished())
        .map(|(filename, tracked)| StateRecord {
            filename,
            version: tracked.version,
            session: &tracked.session,
        })
        .collect();
    encode_states(&records).map(Some)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use drill_core::QuizSession;
    use drill_core::model::{Dictionary, Entry, Version};
    use drill_core::time::fixed_now;
    use storage::repository::{InMemoryStore, StorageError};
    use tokio::sync::{Notify, Semaphore};

    use super::*;
    use crate::quiz::TrackedSession;

    /// Records every image; each write waits for a permit first.
    struct GatedStore {
        gate: Semaphore,
        entered: Notify,
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl GatedStore {
        fn closed() -> Self {
            Self {
                gate: Semaphore::new(0),
                entered: Notify::new(),
                writes: Mutex::new(Vec::new()),
            }
        }

        fn record_counts(&self) -> Vec<i32> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .map(|image| record_count(image))
                .collect()
        }
    }

    #[async_trait]
    impl SessionStateStore for GatedStore {
        async fn read_states(&self) -> Result<Option<Vec<u8>>, StorageError> {
            Ok(self.writes.lock().unwrap().last().cloned())
        }

        async fn write_states(&self, bytes: &[u8]) -> Result<(), StorageError> {
            self.entered.notify_one();
            self.gate.acquire().await.unwrap().forget();
            self.writes.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    fn record_count(image: &[u8]) -> i32 {
        i32::from_le_bytes([image[0], image[1], image[2], image[3]])
    }

    fn loaded_table() -> SharedTable {
        Arc::new(Mutex::new(SessionTable {
            loaded: true,
            ..SessionTable::default()
        }))
    }

    fn add_session(table: &SharedTable, filename: &str) {
        let entries = vec![Entry::new("q0", "a0"), Entry::new("q1", "a1")];
        let dictionary =
            Dictionary::new(filename, filename, "tests", fixed_now(), Version::new(1), entries)
                .unwrap();
        let session = QuizSession::seeded(Arc::new(dictionary), 5).unwrap();
        table.lock().unwrap().sessions.insert(
            filename.to_owned(),
            TrackedSession {
                version: Version::new(1),
                session,
            },
        );
    }

    #[tokio::test]
    async fn requests_during_a_write_fold_into_one_save() {
        let table = loaded_table();
        let store = Arc::new(GatedStore::closed());
        let handle = SaveHandle::spawn(Arc::clone(&table), store.clone());

        handle.request();
        store.entered.notified().await;
        for _ in 0..100 {
            handle.request();
        }
        // The queued save has not run yet, so it sees this change.
        add_session(&table, "a.dic");

        store.gate.add_permits(Semaphore::MAX_PERMITS / 2);
        handle.flush().await.unwrap();

        // Blocked write, one coalesced save, then the flush.
        assert_eq!(store.record_counts(), vec![0, 1, 1]);
    }

    #[tokio::test]
    async fn flush_returns_after_the_latest_state_is_stored() {
        let table = loaded_table();
        let store = InMemoryStore::new();
        let handle = SaveHandle::spawn(Arc::clone(&table), Arc::new(store.clone()));

        add_session(&table, "a.dic");
        handle.request();
        add_session(&table, "b.dic");
        handle.flush().await.unwrap();

        let image = store.read_states().await.unwrap().unwrap();
        assert_eq!(record_count(&image), 2);
    }

    #[tokio::test]
    async fn nothing_is_encoded_before_load() {
        let table: SharedTable = Arc::default();
        add_session(&table, "a.dic");
        assert!(encode_table(&table.lock().unwrap()).unwrap().is_none());

        table.lock().unwrap().loaded = true;
        let image = encode_table(&table.lock().unwrap()).unwrap().unwrap();
        assert_eq!(record_count(&image), 1);
    }
}
