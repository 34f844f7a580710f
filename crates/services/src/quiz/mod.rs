//! Live quiz sessions and their persistence.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use drill_core::QuizSession;
use drill_core::model::Version;

mod saver;
mod service;

pub use service::{AnswerOutcome, LoadReport, QuizService};

/// A session with the catalog version it runs against.
pub(crate) struct TrackedSession {
    pub(crate) version: Version,
    pub(crate) session: QuizSession,
}

#[derive(Default)]
pub(crate) struct SessionTable {
    /// Set once saved progress has been read (or found absent).
    pub(crate) loaded: bool,
    pub(crate) sessions: BTreeMap<String, TrackedSession>,
}

pub(crate) type SharedTable = Arc<Mutex<SessionTable>>;
