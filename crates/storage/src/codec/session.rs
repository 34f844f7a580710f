//! Saved quiz progress.
//!
//! Session block:
//!
//! ```text
//! i32     batch length
//! i32[]   batch entry indices
//! i32     cursor
//! i32     flag count
//! u8[]    correct flags (one byte each)
//! i32     questions asked
//! i32     right answers
//! ```
//!
//! `states.dat` is an i32 record count followed by records of
//! `filename (string), version (i32), session block`.

use std::io::{Read, Write};
use std::sync::Arc;

use drill_core::QuizSession;
use drill_core::model::{Dictionary, Version};

use super::{
    CodecError, read_bool, read_i32, read_len, read_string, skip_bytes, write_bool, write_i32,
    write_len, write_string,
};

//
// ─── SESSION BLOCK ─────────────────────────────────────────────────────────────
//

/// Raw session block as stored, before it is checked against a dictionary.
///
/// Reading the whole block first keeps the stream aligned on the next record
/// even when the contents turn out to be unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub batch: Vec<i32>,
    pub cursor: i32,
    pub correct: Vec<bool>,
    pub questions_asked: i32,
    pub right_answers: i32,
}

impl PersistedSession {
    /// Capture the persisted fields of a live session.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::OutOfRange` if an index or counter exceeds `i32`.
    pub fn from_session(session: &QuizSession) -> Result<Self, CodecError> {
        let to_i32 = |value: usize, field: &'static str| {
            i32::try_from(value).map_err(|_| CodecError::OutOfRange {
                field,
                value: value as u64,
            })
        };
        let counter = |value: u32, field: &'static str| {
            i32::try_from(value).map_err(|_| CodecError::OutOfRange {
                field,
                value: u64::from(value),
            })
        };

        Ok(Self {
            batch: session
                .batch()
                .iter()
                .map(|&index| to_i32(index, "batch index"))
                .collect::<Result<_, _>>()?,
            cursor: to_i32(session.cursor(), "cursor")?,
            correct: session.correct_flags().to_vec(),
            questions_asked: counter(session.questions_asked(), "questions asked")?,
            right_answers: counter(session.right_answers(), "right answers")?,
        })
    }

    /// Rebuild a resumable session for `dictionary`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::OutOfRange` for negative values and
    /// `CodecError::State` when the block does not fit the dictionary.
    pub fn into_session(self, dictionary: Arc<Dictionary>) -> Result<QuizSession, CodecError> {
        let non_negative = |value: i32, field: &'static str| {
            usize::try_from(value).map_err(|_| CodecError::OutOfRange {
                field,
                value: u64::from(value.unsigned_abs()),
            })
        };
        let counter = |value: i32, field: &'static str| {
            u32::try_from(value).map_err(|_| CodecError::OutOfRange {
                field,
                value: u64::from(value.unsigned_abs()),
            })
        };

        let batch = self
            .batch
            .iter()
            .map(|&index| non_negative(index, "batch index"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QuizSession::from_persisted(
            dictionary,
            batch,
            non_negative(self.cursor, "cursor")?,
            self.correct,
            counter(self.questions_asked, "questions asked")?,
            counter(self.right_answers, "right answers")?,
        )?)
    }

    /// Write the session block.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` on I/O failure.
    pub fn write(&self, writer: &mut impl Write) -> Result<(), CodecError> {
        write_len(writer, self.batch.len(), "batch length")?;
        for &index in &self.batch {
            write_i32(writer, index)?;
        }
        write_i32(writer, self.cursor)?;
        write_len(writer, self.correct.len(), "flag count")?;
        for &flag in &self.correct {
            write_bool(writer, flag)?;
        }
        write_i32(writer, self.questions_asked)?;
        write_i32(writer, self.right_answers)
    }

    /// Read one session block.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the block is truncated or has a negative length.
    pub fn read(reader: &mut impl Read) -> Result<Self, CodecError> {
        let batch_len = read_len(reader, "batch length")?;
        let mut batch = Vec::new();
        for _ in 0..batch_len {
            batch.push(read_i32(reader)?);
        }
        let cursor = read_i32(reader)?;
        let flag_count = read_len(reader, "flag count")?;
        let mut correct = Vec::new();
        for _ in 0..flag_count {
            correct.push(read_bool(reader)?);
        }
        let questions_asked = read_i32(reader)?;
        let right_answers = read_i32(reader)?;

        Ok(Self {
            batch,
            cursor,
            correct,
            questions_asked,
            right_answers,
        })
    }

    /// Advance past one session block using only its length prefixes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the block is truncated or has a negative length.
    pub fn skip(reader: &mut impl Read) -> Result<(), CodecError> {
        let batch_len = read_len(reader, "batch length")?;
        skip_bytes(reader, batch_len as u64 * 4)?;
        read_i32(reader)?;
        let flag_count = read_len(reader, "flag count")?;
        skip_bytes(reader, flag_count as u64)?;
        skip_bytes(reader, 8)
    }
}

//
// ─── STATES FILE ───────────────────────────────────────────────────────────────
//

/// One record to be written to `states.dat`.
#[derive(Debug, Clone, Copy)]
pub struct StateRecord<'a> {
    pub filename: &'a str,
    pub version: Version,
    pub session: &'a QuizSession,
}

/// Key of a stored record: the dictionary it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecordHeader {
    pub filename: String,
    pub version: Version,
}

/// Serialize every record into a complete `states.dat` image.
///
/// # Errors
///
/// Returns `CodecError::OutOfRange` if a session does not fit the format.
pub fn encode_states(records: &[StateRecord<'_>]) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    write_len(&mut buf, records.len(), "record count")?;
    for record in records {
        write_string(&mut buf, record.filename)?;
        write_i32(&mut buf, record.version.value())?;
        PersistedSession::from_session(record.session)?.write(&mut buf)?;
    }
    Ok(buf)
}

/// Streaming reader over `states.dat`.
///
/// After each [`StatesReader::next_header`] the caller must consume the
/// session block with either [`StatesReader::read_state`] or
/// [`StatesReader::skip_state`].
pub struct StatesReader<R> {
    reader: R,
    remaining: usize,
}

impl<R: Read> StatesReader<R> {
    /// Read the record count and position on the first record.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the count cannot be read or is negative.
    pub fn new(mut reader: R) -> Result<Self, CodecError> {
        let remaining = read_len(&mut reader, "record count")?;
        Ok(Self { reader, remaining })
    }

    /// Records not yet visited.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Read the next record key, or `None` once every record was visited.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the key is truncated or malformed.
    pub fn next_header(&mut self) -> Result<Option<StateRecordHeader>, CodecError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let filename = read_string(&mut self.reader)?;
        let version = Version::new(read_i32(&mut self.reader)?);
        Ok(Some(StateRecordHeader { filename, version }))
    }

    /// Read the session block of the current record.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the block is truncated.
    pub fn read_state(&mut self) -> Result<PersistedSession, CodecError> {
        PersistedSession::read(&mut self.reader)
    }

    /// Skip the session block of the current record.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the block is truncated.
    pub fn skip_state(&mut self) -> Result<(), CodecError> {
        PersistedSession::skip(&mut self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::model::Entry;
    use drill_core::time::fixed_now;
    use std::io::Cursor;

    fn dictionary(size: usize) -> Arc<Dictionary> {
        let entries = (0..size)
            .map(|i| Entry::new(format!("q{i}"), format!("a{i}")))
            .collect();
        Arc::new(
            Dictionary::new("d", "Dict", "me", fixed_now(), Version::new(1), entries).unwrap(),
        )
    }

    fn played_session(dic: &Arc<Dictionary>) -> QuizSession {
        let mut session = QuizSession::seeded(Arc::clone(dic), 42).unwrap();
        for step in 0..7 {
            if step % 3 == 0 {
                session.submit_answer("wrong").unwrap();
            } else {
                let answer = session.current_entry().unwrap().answer().to_owned();
                session.submit_answer(&answer).unwrap();
            }
        }
        session
    }

    #[test]
    fn block_layout_matches_format() {
        let dic = dictionary(2);
        let session =
            QuizSession::from_persisted(Arc::clone(&dic), vec![1, 0], 1, vec![true, false], 3, 1)
                .unwrap();

        let mut buf = Vec::new();
        PersistedSession::from_session(&session)
            .unwrap()
            .write(&mut buf)
            .unwrap();

        let expected: Vec<u8> = [
            &2_i32.to_le_bytes()[..],
            &1_i32.to_le_bytes(),
            &0_i32.to_le_bytes(),
            &1_i32.to_le_bytes(),
            &2_i32.to_le_bytes(),
            &[1, 0],
            &3_i32.to_le_bytes(),
            &1_i32.to_le_bytes(),
        ]
        .concat();
        assert_eq!(buf, expected);
    }

    #[test]
    fn reencoding_a_loaded_session_is_byte_identical() {
        let dic = dictionary(6);
        let session = played_session(&dic);

        let mut first = Vec::new();
        PersistedSession::from_session(&session)
            .unwrap()
            .write(&mut first)
            .unwrap();

        let loaded = PersistedSession::read(&mut Cursor::new(&first))
            .unwrap()
            .into_session(Arc::clone(&dic))
            .unwrap();
        assert!(!loaded.is_finished());

        let mut second = Vec::new();
        PersistedSession::from_session(&loaded)
            .unwrap()
            .write(&mut second)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn skip_lands_on_next_record() {
        let dic = dictionary(6);
        let a = played_session(&dic);
        let b = QuizSession::seeded(Arc::clone(&dic), 9).unwrap();
        let bytes = encode_states(&[
            StateRecord {
                filename: "a.dic",
                version: Version::new(1),
                session: &a,
            },
            StateRecord {
                filename: "b.dic",
                version: Version::new(2),
                session: &b,
            },
        ])
        .unwrap();

        let mut reader = StatesReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.remaining(), 2);

        let first = reader.next_header().unwrap().unwrap();
        assert_eq!(first.filename, "a.dic");
        reader.skip_state().unwrap();

        let second = reader.next_header().unwrap().unwrap();
        assert_eq!(
            second,
            StateRecordHeader {
                filename: "b.dic".into(),
                version: Version::new(2),
            }
        );
        let restored = reader.read_state().unwrap().into_session(dic).unwrap();
        assert_eq!(restored.batch(), b.batch());
        assert!(reader.next_header().unwrap().is_none());
    }

    #[test]
    fn block_for_other_dictionary_is_rejected_after_full_read() {
        let big = dictionary(6);
        let session = played_session(&big);
        let mut buf = Vec::new();
        PersistedSession::from_session(&session)
            .unwrap()
            .write(&mut buf)
            .unwrap();
        buf.extend_from_slice(&[0xAA]);

        let mut cursor = Cursor::new(buf);
        let raw = PersistedSession::read(&mut cursor).unwrap();
        let err = raw.into_session(dictionary(3)).unwrap_err();
        assert!(matches!(err, CodecError::State(_)));
        assert_eq!(cursor.position() as usize, cursor.get_ref().len() - 1);
    }

    #[test]
    fn negative_counter_is_rejected() {
        let raw = PersistedSession {
            batch: vec![0],
            cursor: 0,
            correct: vec![false],
            questions_asked: -1,
            right_answers: 0,
        };
        let err = raw.into_session(dictionary(1)).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { field: "questions asked", .. }));
    }

    #[test]
    fn truncated_block_cannot_be_skipped() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 10).unwrap();
        write_i32(&mut buf, 0).unwrap();
        let err = PersistedSession::skip(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
