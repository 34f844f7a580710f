use std::sync::Arc;

use storage::repository::Storage;
use tracing::warn;

use crate::config::SyncConfig;
use crate::error::AppServicesError;
use crate::quiz::{LoadReport, QuizService};
use crate::remote::{HttpRemoteCatalog, RemoteCatalog};
use crate::sync::{ReconcileOutcome, SyncManager};

/// Assembles the sync manager and quiz service over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    sync: Arc<SyncManager>,
    quiz: Arc<QuizService>,
}

impl AppServices {
    /// Build services backed by the data directory and remote host in `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the data directory cannot be opened.
    pub async fn from_config(config: &SyncConfig) -> Result<Self, AppServicesError> {
        let storage = Storage::filesystem(&config.data_dir).await?;
        let remote: Arc<dyn RemoteCatalog> =
            Arc::new(HttpRemoteCatalog::new(config.remote_url.clone()));
        Ok(Self::new(storage, remote, config.persist_after_update))
    }

    /// Wire services over explicit parts. Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(storage: Storage, remote: Arc<dyn RemoteCatalog>, persist_after_update: bool) -> Self {
        let sync = Arc::new(
            SyncManager::new(remote, Arc::clone(&storage.dictionaries))
                .with_persist_after_update(persist_after_update),
        );
        let quiz = Arc::new(QuizService::new(Arc::clone(&storage.states)));
        Self { sync, quiz }
    }

    /// Reconcile the catalog, then bring quiz sessions in line with it:
    /// saved progress is loaded on the first available catalog, and live
    /// sessions are re-bound on later ones.
    pub async fn refresh(&self) -> (ReconcileOutcome, Option<LoadReport>) {
        let outcome = self.sync.reconcile().await;
        if !self.sync.is_available() {
            return (outcome, None);
        }
        let catalog = self.sync.snapshot();
        if self.quiz.is_loaded() {
            self.quiz.retain_catalog(&catalog);
            return (outcome, None);
        }
        match self.quiz.load_states(&catalog).await {
            Ok(report) => (outcome, Some(report)),
            Err(err) => {
                warn!(error = %err, "could not load saved quiz progress");
                self.quiz.retain_catalog(&catalog);
                (outcome, None)
            }
        }
    }

    #[must_use]
    pub fn sync(&self) -> Arc<SyncManager> {
        Arc::clone(&self.sync)
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizService> {
        Arc::clone(&self.quiz)
    }
}
