use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::Version;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DictionaryError {
    #[error("dictionary identifier cannot be empty")]
    EmptyIdentifier,

    #[error("dictionary name cannot be empty")]
    EmptyName,

    #[error("entry {index} has an empty question")]
    EmptyQuestion { index: usize },
}

//
// ─── ENTRY ─────────────────────────────────────────────────────────────────────
//

/// A single question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    question: String,
    answer: String,
}

impl Entry {
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }
}

//
// ─── DICTIONARY ────────────────────────────────────────────────────────────────
//

/// Immutable, versioned collection of question/answer entries.
///
/// Entry order is significant: quiz progress refers to entries by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dictionary {
    identifier: String,
    name: String,
    author: String,
    created_on: DateTime<Utc>,
    version: Version,
    entries: Vec<Entry>,
}

impl Dictionary {
    /// Creates a dictionary after validating its metadata and entries.
    ///
    /// # Errors
    ///
    /// Returns `DictionaryError` if the identifier or name is blank, or an
    /// entry has an empty question.
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        author: impl Into<String>,
        created_on: DateTime<Utc>,
        version: Version,
        entries: Vec<Entry>,
    ) -> Result<Self, DictionaryError> {
        let identifier = identifier.into();
        let name = name.into();
        if identifier.trim().is_empty() {
            return Err(DictionaryError::EmptyIdentifier);
        }
        if name.trim().is_empty() {
            return Err(DictionaryError::EmptyName);
        }
        if let Some(index) = entries.iter().position(|e| e.question.is_empty()) {
            return Err(DictionaryError::EmptyQuestion { index });
        }

        Ok(Self {
            identifier,
            name,
            author: author.into(),
            created_on,
            version,
            entries,
        })
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    #[must_use]
    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
