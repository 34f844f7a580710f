//! Binary encodings for dictionary bodies and saved quiz progress.
//!
//! Integers are little-endian. Strings carry a 7-bit varint byte-length
//! prefix followed by UTF-8 bytes.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use drill_core::QuizError;
use drill_core::model::DictionaryError;

pub mod dictionary;
pub mod session;

pub use dictionary::{decode_dictionary, encode_dictionary};
pub use session::{PersistedSession, StateRecord, StateRecordHeader, StatesReader, encode_states};

/// Errors raised while reading or writing the binary formats.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("negative length {len} for {field}")]
    NegativeLength { field: &'static str, len: i32 },

    #[error("length prefix overflows 32 bits")]
    LengthOverflow,

    #[error("{field} does not fit the format: {value}")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid timestamp {0}")]
    InvalidTimestamp(i64),

    #[error("{0} trailing bytes after dictionary body")]
    TrailingBytes(usize),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    #[error(transparent)]
    State(#[from] QuizError),
}

pub(crate) fn read_i32(reader: &mut impl Read) -> Result<i32, CodecError> {
    Ok(reader.read_i32::<LittleEndian>()?)
}

pub(crate) fn write_i32(writer: &mut impl Write, value: i32) -> Result<(), CodecError> {
    Ok(writer.write_i32::<LittleEndian>(value)?)
}

pub(crate) fn read_i64(reader: &mut impl Read) -> Result<i64, CodecError> {
    Ok(reader.read_i64::<LittleEndian>()?)
}

pub(crate) fn write_i64(writer: &mut impl Write, value: i64) -> Result<(), CodecError> {
    Ok(writer.write_i64::<LittleEndian>(value)?)
}

/// Any non-zero byte reads as `true`.
pub(crate) fn read_bool(reader: &mut impl Read) -> Result<bool, CodecError> {
    Ok(reader.read_u8()? != 0)
}

pub(crate) fn write_bool(writer: &mut impl Write, value: bool) -> Result<(), CodecError> {
    Ok(writer.write_u8(u8::from(value))?)
}

/// Reads an i32 length prefix and rejects negative values.
pub(crate) fn read_len(reader: &mut impl Read, field: &'static str) -> Result<usize, CodecError> {
    let len = read_i32(reader)?;
    usize::try_from(len).map_err(|_| CodecError::NegativeLength { field, len })
}

pub(crate) fn write_len(
    writer: &mut impl Write,
    len: usize,
    field: &'static str,
) -> Result<(), CodecError> {
    let len = i32::try_from(len).map_err(|_| CodecError::OutOfRange {
        field,
        value: len as u64,
    })?;
    write_i32(writer, len)
}

fn read_7bit_len(reader: &mut impl Read) -> Result<usize, CodecError> {
    let mut value: u32 = 0;
    for shift in (0..35).step_by(7) {
        let byte = reader.read_u8()?;
        let chunk = u32::from(byte & 0x7F);
        if shift == 28 && chunk > 0x0F {
            return Err(CodecError::LengthOverflow);
        }
        value |= chunk << shift;
        if byte & 0x80 == 0 {
            return usize::try_from(value).map_err(|_| CodecError::LengthOverflow);
        }
    }
    Err(CodecError::LengthOverflow)
}

fn write_7bit_len(writer: &mut impl Write, len: usize) -> Result<(), CodecError> {
    let mut value = u32::try_from(len).map_err(|_| CodecError::OutOfRange {
        field: "string length",
        value: len as u64,
    })?;
    while value >= 0x80 {
        writer.write_u8((value as u8) | 0x80)?;
        value >>= 7;
    }
    writer.write_u8(value as u8)?;
    Ok(())
}

pub(crate) fn read_string(reader: &mut impl Read) -> Result<String, CodecError> {
    let len = read_7bit_len(reader)?;
    let mut bytes = Vec::new();
    let read = reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if read != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
}

pub(crate) fn write_string(writer: &mut impl Write, value: &str) -> Result<(), CodecError> {
    write_7bit_len(writer, value.len())?;
    Ok(writer.write_all(value.as_bytes())?)
}

/// Consumes exactly `len` bytes without keeping them.
pub(crate) fn skip_bytes(reader: &mut impl Read, len: u64) -> Result<(), CodecError> {
    let skipped = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if skipped != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn string_prefix_uses_varint() {
        let mut buf = Vec::new();
        write_string(&mut buf, &"x".repeat(200)).unwrap();
        assert_eq!(&buf[..2], &[0xC8, 0x01]);
        assert_eq!(buf.len(), 202);

        let decoded = read_string(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.len(), 200);
    }

    #[test]
    fn truncated_string_is_an_error() {
        let buf = vec![5, b'a', b'b'];
        let err = read_string(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn overlong_varint_is_rejected() {
        let buf = vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let err = read_string(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, CodecError::LengthOverflow));
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -1).unwrap();
        let err = read_len(&mut Cursor::new(buf), "batch").unwrap_err();
        assert!(matches!(err, CodecError::NegativeLength { field: "batch", len: -1 }));
    }

    #[test]
    fn integers_are_little_endian() {
        let mut buf = Vec::new();
        write_i32(&mut buf, 0x0102_0304).unwrap();
        assert_eq!(buf, vec![4, 3, 2, 1]);
    }
}
