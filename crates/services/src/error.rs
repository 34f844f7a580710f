//! Shared error types for the services crate.

use thiserror::Error;

use drill_core::QuizError;
use storage::codec::CodecError;
use storage::index::IndexError;
use storage::repository::StorageError;

/// Failures talking to the dictionary host.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("request to {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("cannot address {0:?} under the remote base URL")]
    InvalidPath(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by a `RemoteCatalog`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("remote manifest is not valid UTF-8")]
    ManifestEncoding,
    #[error("malformed remote manifest: {0}")]
    Manifest(#[from] IndexError),
}

/// Reasons a reconciliation tier gave up. Always folded into an outcome.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReconcileError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("no dictionaries saved on this device")]
    NothingSaved,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("stored dictionary {filename} is unreadable: {source}")]
    Body {
        filename: String,
        #[source]
        source: CodecError,
    },
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    #[error("no dictionary named {0:?} in the catalog")]
    UnknownDictionary(String),
    #[error("no quiz in progress for {0:?}")]
    NoSession(String),
    #[error("progress save worker has stopped")]
    SaveWorkerStopped,
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Invalid configuration values.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid remote URL {raw:?}: {source}")]
    InvalidUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },
    #[error("remote URL {0:?} cannot hold relative paths")]
    NotABase(String),
    #[error("invalid boolean for {var}: {raw:?}")]
    InvalidFlag { var: &'static str, raw: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
