//! Text index of cached dictionaries (`meta.txt`).
//!
//! One `<filename> <version>` pair per line. The remote manifest uses the
//! same format.

use std::fmt::Write as _;

use drill_core::model::Version;
use thiserror::Error;

use crate::{INDEX_FILE, STATES_FILE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IndexError {
    #[error("line {line}: missing version")]
    MissingVersion { line: usize },

    #[error("line {line}: unexpected trailing field")]
    TrailingField { line: usize },

    #[error("line {line}: invalid version {raw:?}")]
    InvalidVersion { line: usize, raw: String },

    #[error("line {line}: invalid filename {name:?}")]
    InvalidFilename { line: usize, name: String },

    #[error("line {line}: duplicate filename {name:?}")]
    Duplicate { line: usize, name: String },
}

/// A dictionary filename and the version stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub filename: String,
    pub version: Version,
}

/// Ordered, filename-unique list of cached dictionaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheIndex {
    entries: Vec<IndexEntry>,
}

/// True when `name` is a single, non-reserved path component.
#[must_use]
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name != INDEX_FILE
        && name != STATES_FILE
        && !name.contains(['/', '\\', '\0'])
}

impl CacheIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse index text. Blank lines are skipped and `\r\n` endings accepted.
    ///
    /// # Errors
    ///
    /// Returns `IndexError` for the first malformed line, unsafe filename,
    /// or repeated filename.
    pub fn parse(text: &str) -> Result<Self, IndexError> {
        let mut index = Self::new();
        for (offset, raw_line) in text.lines().enumerate() {
            let line = offset + 1;
            let mut fields = raw_line.split_whitespace();
            let Some(name) = fields.next() else {
                continue;
            };
            let raw_version = fields.next().ok_or(IndexError::MissingVersion { line })?;
            if fields.next().is_some() {
                return Err(IndexError::TrailingField { line });
            }
            if !is_valid_filename(name) {
                return Err(IndexError::InvalidFilename {
                    line,
                    name: name.to_owned(),
                });
            }
            let version = raw_version
                .parse::<Version>()
                .map_err(|_| IndexError::InvalidVersion {
                    line,
                    raw: raw_version.to_owned(),
                })?;
            if index.get(name).is_some() {
                return Err(IndexError::Duplicate {
                    line,
                    name: name.to_owned(),
                });
            }
            index.entries.push(IndexEntry {
                filename: name.to_owned(),
                version,
            });
        }
        Ok(index)
    }

    /// Render as index text, one newline-terminated line per entry.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(out, "{} {}", entry.filename, entry.version);
        }
        out
    }

    #[must_use]
    pub fn get(&self, filename: &str) -> Option<Version> {
        self.entries
            .iter()
            .find(|e| e.filename == filename)
            .map(|e| e.version)
    }

    /// True when `filename` is already stored at `version` or newer.
    #[must_use]
    pub fn is_current(&self, filename: &str, version: Version) -> bool {
        self.get(filename).is_some_and(|stored| stored >= version)
    }

    /// Insert or replace the version for `filename`, keeping its position.
    pub fn upsert(&mut self, filename: &str, version: Version) {
        match self.entries.iter_mut().find(|e| e.filename == filename) {
            Some(entry) => entry.version = version,
            None => self.entries.push(IndexEntry {
                filename: filename.to_owned(),
                version,
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
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
}

impl FromIterator<IndexEntry> for CacheIndex {
    fn from_iter<T: IntoIterator<Item = IndexEntry>>(iter: T) -> Self {
        let mut index = Self::new();
        for entry in iter {
            index.upsert(&entry.filename, entry.version);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_lines_in_order() {
        let index = CacheIndex::parse("german.dic 65537\r\nfrench.dic 3\n\n").unwrap();
        let names: Vec<_> = index.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["german.dic", "french.dic"]);
        assert_eq!(index.get("german.dic"), Some(Version::from_parts(1, 1)));
    }

    #[test]
    fn render_matches_parse() {
        let text = "a.dic 1\nb.dic -4\n";
        assert_eq!(CacheIndex::parse(text).unwrap().render(), text);
    }

    #[test]
    fn reports_line_numbers() {
        assert_eq!(
            CacheIndex::parse("a.dic 1\nb.dic\n").unwrap_err(),
            IndexError::MissingVersion { line: 2 }
        );
        assert_eq!(
            CacheIndex::parse("a.dic one").unwrap_err(),
            IndexError::InvalidVersion {
                line: 1,
                raw: "one".into()
            }
        );
        assert_eq!(
            CacheIndex::parse("a.dic 1 extra").unwrap_err(),
            IndexError::TrailingField { line: 1 }
        );
    }

    #[test]
    fn rejects_unsafe_and_duplicate_names() {
        assert!(matches!(
            CacheIndex::parse("../etc/passwd 1"),
            Err(IndexError::InvalidFilename { line: 1, .. })
        ));
        assert!(matches!(
            CacheIndex::parse("states.dat 1"),
            Err(IndexError::InvalidFilename { .. })
        ));
        assert!(matches!(
            CacheIndex::parse("a.dic 1\na.dic 2"),
            Err(IndexError::Duplicate { line: 2, .. })
        ));
    }

    #[test]
    fn upsert_keeps_position_and_is_current_compares_versions() {
        let mut index = CacheIndex::parse("a.dic 1\nb.dic 5\n").unwrap();
        index.upsert("a.dic", Version::new(3));
        index.upsert("c.dic", Version::new(1));
        assert_eq!(index.render(), "a.dic 3\nb.dic 5\nc.dic 1\n");

        assert!(index.is_current("b.dic", Version::new(5)));
        assert!(index.is_current("b.dic", Version::new(4)));
        assert!(!index.is_current("b.dic", Version::new(6)));
        assert!(!index.is_current("zzz", Version::new(0)));
    }
}
