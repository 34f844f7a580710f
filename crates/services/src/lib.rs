#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod quiz;
pub mod remote;
pub mod sync;

pub use app_services::AppServices;
pub use config::SyncConfig;
pub use error::{
    AppServicesError, ConfigError, QuizServiceError, ReconcileError, RemoteError, TransportError,
};
pub use quiz::{AnswerOutcome, LoadReport, QuizService};
pub use remote::{HttpRemoteCatalog, RemoteCatalog};
pub use sync::{CacheEntry, Catalog, CatalogEvent, PersistReport, ReconcileOutcome, SyncManager};
