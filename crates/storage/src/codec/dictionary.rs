use std::io::{Cursor, Read, Write};

use drill_core::model::{Dictionary, Entry, Version};
use drill_core::time::{from_unix_seconds, to_unix_seconds};

use super::{
    CodecError, read_i32, read_i64, read_len, read_string, write_i32, write_i64, write_len,
    write_string,
};

/// Serialize a dictionary body.
///
/// Layout: identifier, name, author (strings), created-on (i64 unix seconds),
/// version (i32), entry count (i32), then question/answer string pairs.
///
/// # Errors
///
/// Returns `CodecError::OutOfRange` if the dictionary is too large for the format.
pub fn encode_dictionary(dictionary: &Dictionary) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    write_dictionary(&mut buf, dictionary)?;
    Ok(buf)
}

/// Parse a complete dictionary body. Trailing bytes are rejected.
///
/// # Errors
///
/// Returns `CodecError` if the bytes are truncated, malformed, or describe an
/// invalid dictionary.
pub fn decode_dictionary(bytes: &[u8]) -> Result<Dictionary, CodecError> {
    let mut cursor = Cursor::new(bytes);
    let dictionary = read_dictionary(&mut cursor)?;
    let consumed = usize::try_from(cursor.position()).unwrap_or(bytes.len());
    let trailing = bytes.len().saturating_sub(consumed);
    if trailing > 0 {
        return Err(CodecError::TrailingBytes(trailing));
    }
    Ok(dictionary)
}

fn write_dictionary(writer: &mut impl Write, dictionary: &Dictionary) -> Result<(), CodecError> {
    write_string(writer, dictionary.identifier())?;
    write_string(writer, dictionary.name())?;
    write_string(writer, dictionary.author())?;
    write_i64(writer, to_unix_seconds(dictionary.created_on()))?;
    write_i32(writer, dictionary.version().value())?;
    write_len(writer, dictionary.len(), "entry count")?;
    for entry in dictionary.entries() {
        write_string(writer, entry.question())?;
        write_string(writer, entry.answer())?;
    }
    Ok(())
}

fn read_dictionary(reader: &mut impl Read) -> Result<Dictionary, CodecError> {
    let identifier = read_string(reader)?;
    let name = read_string(reader)?;
    let author = read_string(reader)?;
    let created_secs = read_i64(reader)?;
    let created_on =
        from_unix_seconds(created_secs).ok_or(CodecError::InvalidTimestamp(created_secs))?;
    let version = Version::new(read_i32(reader)?);
    let count = read_len(reader, "entry count")?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let question = read_string(reader)?;
        let answer = read_string(reader)?;
        entries.push(Entry::new(question, answer));
    }

    Ok(Dictionary::new(
        identifier, name, author, created_on, version, entries,
    )?)
}
