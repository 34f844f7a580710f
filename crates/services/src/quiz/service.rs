use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use drill_core::{QuizProgress, QuizSession};
use storage::codec::{PersistedSession, StatesReader};
use storage::repository::SessionStateStore;

use super::saver::SaveHandle;
use super::{SessionTable, SharedTable, TrackedSession};
use crate::error::QuizServiceError;
use crate::sync::Catalog;

/// Result of one submitted answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub correct: bool,
    /// The expected answer, when the submitted one was wrong.
    pub expected: Option<String>,
    pub finished: bool,
    pub progress: QuizProgress,
}

/// Counts from one `load_states` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Records turned back into live sessions.
    pub restored: usize,
    /// Records for dictionaries missing from the catalog or of another major version.
    pub skipped: usize,
    /// Records that did not fit their dictionary.
    pub rejected: usize,
}

/// Quiz sessions keyed by dictionary filename, saved in the background.
pub struct QuizService {
    table: SharedTable,
    store: Arc<dyn SessionStateStore>,
    saver: SaveHandle,
}

impl QuizService {
    /// Create the service and its save worker.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStateStore>) -> Self {
        let table: SharedTable = Arc::new(Mutex::new(SessionTable::default()));
        let saver = SaveHandle::spawn(Arc::clone(&table), Arc::clone(&store));
        Self {
            table,
            store,
            saver,
        }
    }

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restore saved progress for dictionaries in `catalog`.
    ///
    /// A record is applied only when the catalog holds its filename at the
    /// same major version. Sessions already live take precedence over saved
    /// ones and are re-bound to `catalog`. When a save file existed, a save is
    /// requested afterwards so records that were skipped disappear from it.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` if the save file cannot be read.
    /// Damage inside the file is logged and never returned.
    pub async fn load_states(&self, catalog: &Catalog) -> Result<LoadReport, QuizServiceError> {
        let bytes = self.store.read_states().await?;
        let mut report = LoadReport::default();
        let mut restored = BTreeMap::new();
        if let Some(bytes) = &bytes {
            read_records(bytes, catalog, &mut restored, &mut report);
        }

        {
            let mut table = self.table();
            let live = std::mem::take(&mut table.sessions);
            for (filename, tracked) in live {
                if let Some(tracked) = rebind(&filename, tracked, catalog) {
                    restored.insert(filename, tracked);
                }
            }
            table.sessions = restored;
            table.loaded = true;
        }

        info!(
            restored = report.restored,
            skipped = report.skipped,
            rejected = report.rejected,
            "loaded saved quiz progress"
        );
        if bytes.is_some() {
            self.saver.request();
        }
        Ok(report)
    }

    /// Re-bind live sessions to a refreshed catalog, dropping those whose
    /// dictionary disappeared or no longer fits. Returns how many were dropped.
    pub fn retain_catalog(&self, catalog: &Catalog) -> usize {
        let dropped = {
            let mut table = self.table();
            let live = std::mem::take(&mut table.sessions);
            let before = live.len();
            for (filename, tracked) in live {
                if let Some(tracked) = rebind(&filename, tracked, catalog) {
                    table.sessions.insert(filename, tracked);
                }
            }
            before - table.sessions.len()
        };
        if dropped > 0 {
            self.saver.request();
        }
        dropped
    }

    /// Resume the session for `filename`, or start one if there is none or
    /// the previous one finished.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::UnknownDictionary` if `filename` is not in
    /// the catalog, or `QuizServiceError::Quiz` if its dictionary is empty.
    pub fn start(&self, catalog: &Catalog, filename: &str) -> Result<QuizProgress, QuizServiceError> {
        let progress = {
            let mut table = self.table();
            if let Some(tracked) = table.sessions.get(filename) {
                if !tracked.session.is_finished() {
                    return Ok(tracked.session.progress());
                }
            }
            let entry = catalog
                .get(filename)
                .ok_or_else(|| QuizServiceError::UnknownDictionary(filename.to_owned()))?;
            let session = QuizSession::new(Arc::clone(entry.dictionary()))?;
            let progress = session.progress();
            table.sessions.insert(
                filename.to_owned(),
                TrackedSession {
                    version: entry.version(),
                    session,
                },
            );
            progress
        };
        debug!(filename, "quiz started");
        self.saver.request();
        Ok(progress)
    }

    /// Question to ask next; empty once the session finished.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::NoSession` if no session exists for `filename`.
    pub fn next_question(&self, filename: &str) -> Result<String, QuizServiceError> {
        let table = self.table();
        let tracked = table
            .sessions
            .get(filename)
            .ok_or_else(|| QuizServiceError::NoSession(filename.to_owned()))?;
        Ok(tracked.session.next_question().to_owned())
    }

    /// Score `answer` against the current question and advance.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::NoSession` if no session exists, or
    /// `QuizServiceError::Quiz` if it already finished.
    pub fn submit_answer(
        &self,
        filename: &str,
        answer: &str,
    ) -> Result<AnswerOutcome, QuizServiceError> {
        let outcome = {
            let mut table = self.table();
            let tracked = table
                .sessions
                .get_mut(filename)
                .ok_or_else(|| QuizServiceError::NoSession(filename.to_owned()))?;
            let correct = tracked.session.submit_answer(answer)?;
            AnswerOutcome {
                correct,
                expected: if correct {
                    None
                } else {
                    tracked.session.last_correct_answer().map(str::to_owned)
                },
                finished: tracked.session.is_finished(),
                progress: tracked.session.progress(),
            }
        };
        self.saver.request();
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns `QuizServiceError::NoSession` if no session exists for `filename`.
    pub fn progress(&self, filename: &str) -> Result<QuizProgress, QuizServiceError> {
        let table = self.table();
        table
            .sessions
            .get(filename)
            .map(|tracked| tracked.session.progress())
            .ok_or_else(|| QuizServiceError::NoSession(filename.to_owned()))
    }

    /// Forget the session for `filename`. Returns whether one existed.
    pub fn discard(&self, filename: &str) -> bool {
        let removed = self.table().sessions.remove(filename).is_some();
        if removed {
            self.saver.request();
        }
        removed
    }

    /// Whether saved progress has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.table().loaded
    }

    #[must_use]
    pub fn has_session(&self, filename: &str) -> bool {
        self.table().sessions.contains_key(filename)
    }

    /// Filenames with a live session, sorted.
    #[must_use]
    pub fn active(&self) -> Vec<String> {
        self.table().sessions.keys().cloned().collect()
    }

    /// Ask for a background save. Requests made while one is pending are
    /// folded into it.
    pub fn request_save(&self) {
        self.saver.request();
    }

    /// Save now and wait for the write.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError` if encoding or writing fails, or the worker stopped.
    pub async fn flush(&self) -> Result<(), QuizServiceError> {
        self.saver.flush().await
    }
}

/// Walk a save file, collecting every usable record. Structural damage stops
/// the walk but keeps what was read before it.
fn read_records(
    bytes: &[u8],
    catalog: &Catalog,
    restored: &mut BTreeMap<String, TrackedSession>,
    report: &mut LoadReport,
) {
    let mut reader = match StatesReader::new(Cursor::new(bytes)) {
        Ok(reader) => reader,
        Err(err) => {
            warn!(error = %err, "saved progress unreadable");
            return;
        }
    };

    loop {
        let header = match reader.next_header() {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "saved progress truncated, keeping earlier records");
                break;
            }
        };

        let target = catalog
            .get(&header.filename)
            .filter(|entry| entry.version().same_major(header.version));
        let Some(entry) = target else {
            debug!(filename = %header.filename, version = %header.version, "skipping saved progress");
            report.skipped += 1;
            if let Err(err) = reader.skip_state() {
                warn!(error = %err, "saved progress truncated, keeping earlier records");
                break;
            }
            continue;
        };

        let raw = match reader.read_state() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "saved progress truncated, keeping earlier records");
                break;
            }
        };
        match raw.into_session(Arc::clone(entry.dictionary())) {
            Ok(session) => {
                restored.insert(
                    header.filename,
                    TrackedSession {
                        version: entry.version(),
                        session,
                    },
                );
                report.restored += 1;
            }
            Err(err) => {
                warn!(filename = %header.filename, error = %err, "discarding saved progress");
                report.rejected += 1;
            }
        }
    }
}

/// Point a live session at the catalog's copy of its dictionary.
fn rebind(filename: &str, tracked: TrackedSession, catalog: &Catalog) -> Option<TrackedSession> {
    let entry = catalog
        .get(filename)
        .filter(|entry| entry.version().same_major(tracked.version))?;
    if Arc::ptr_eq(entry.dictionary(), tracked.session.dictionary()) {
        return Some(TrackedSession {
            version: entry.version(),
            session: tracked.session,
        });
    }
    let moved = PersistedSession::from_session(&tracked.session)
        .and_then(|raw| raw.into_session(Arc::clone(entry.dictionary())));
    match moved {
        Ok(session) => Some(TrackedSession {
            version: entry.version(),
            session,
        }),
        Err(err) => {
            warn!(filename, error = %err, "dropping session that no longer fits its dictionary");
            None
        }
    }
}
