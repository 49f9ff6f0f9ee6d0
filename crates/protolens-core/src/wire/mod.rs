//! Low-level protobuf wire format parsing.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint header containing the field number and wire type
//! - The field payload (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)
//!
//! The deprecated group markers (3 and 4) are rejected like any other
//! unknown code.

mod cursor;
mod value;

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fmt;

pub use cursor::{decode_varint, ByteCursor, MAX_VARINT_LEN};
pub use value::{byte_array_literal, WireValue};

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Protobuf wire types understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    LengthDelimited = 2,
    /// 32-bit fixed-width
    Fixed32 = 5,
}

impl WireType {
    /// Wire type for a header code, if the code is supported
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    /// Short display name
    pub fn as_str(&self) -> &'static str {
        match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "len",
            WireType::Fixed32 => "fixed32",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field occurrence as read off the wire.
///
/// Offsets are relative to the buffer the field was read from. `end_offset`
/// is inclusive: it points at the last payload byte.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    /// Field number from the header
    pub number: u32,
    /// Wire type from the header
    pub wire_type: WireType,
    /// Decoded payload
    pub value: WireValue,
    /// Payload bytes exactly as encoded (without header or length prefix)
    pub raw: Bytes,
    /// Offset of the first header byte
    pub start_offset: usize,
    /// Offset of the first payload byte
    pub data_offset: usize,
    /// Offset of the last payload byte
    pub end_offset: usize,
}

impl RawField {
    /// Number of bytes the field occupies on the wire
    pub fn encoded_len(&self) -> usize {
        self.end_offset - self.start_offset + 1
    }
}

/// Reads fields one at a time from a buffer.
///
/// [`read_field`](Self::read_field) returns `Ok(None)` at the end of the
/// buffer. As an iterator, the reader yields every field and stops after
/// the first error.
#[derive(Debug, Clone)]
pub struct FieldReader {
    cursor: ByteCursor,
    failed: bool,
}

impl FieldReader {
    /// Creates a reader over `data`
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            failed: false,
        }
    }

    /// Current position within the buffer
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Reads the next field, or `None` once the buffer is exhausted.
    ///
    /// A failed read leaves the position at the start of the offending field.
    pub fn read_field(&mut self) -> Result<Option<RawField>> {
        if self.cursor.is_empty() {
            return Ok(None);
        }

        let start = self.cursor.position();
        match self.read_field_at(start) {
            Ok(field) => Ok(Some(field)),
            Err(e) => {
                self.cursor.rewind(start);
                Err(e)
            }
        }
    }

    fn read_field_at(&mut self, start: usize) -> Result<RawField> {
        let (header, header_len) = self.cursor.read_varint()?;

        let code = (header & 0x07) as u8;
        let wire_type = WireType::from_code(code).ok_or(Error::InvalidWireType {
            offset: start,
            wire_type: code,
        })?;

        let number = header >> 3;
        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(Error::InvalidFieldNumber {
                offset: start,
                number,
            });
        }

        let value = match wire_type {
            WireType::Varint => WireValue::Varint(self.cursor.read_varint()?.0),
            WireType::Fixed64 => WireValue::Fixed64(self.cursor.read_fixed64()?),
            WireType::LengthDelimited => {
                WireValue::LengthDelimited(self.cursor.read_length_delimited()?)
            }
            WireType::Fixed32 => WireValue::Fixed32(self.cursor.read_fixed32()?),
        };

        let end = self.cursor.position();
        let data_offset = match &value {
            WireValue::LengthDelimited(payload) => end - payload.len(),
            _ => start + header_len,
        };

        Ok(RawField {
            number: number as u32,
            wire_type,
            raw: self.cursor.get_ref().slice(data_offset..end),
            value,
            start_offset: start,
            data_offset,
            end_offset: end - 1,
        })
    }
}

impl Iterator for FieldReader {
    type Item = Result<RawField>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_field() {
            Ok(field) => field.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads every field in `data`, failing on the first malformed one.
pub fn read_fields(data: impl Into<Bytes>) -> Result<Vec<RawField>> {
    FieldReader::new(data).collect()
}

/// Returns true if `data` parses as a sequence of fields with no bytes left over.
pub fn is_well_formed(data: &Bytes) -> bool {
    FieldReader::new(data.clone()).all(|field| field.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_type_codes() {
        assert_eq!(WireType::from_code(0), Some(WireType::Varint));
        assert_eq!(WireType::from_code(1), Some(WireType::Fixed64));
        assert_eq!(WireType::from_code(2), Some(WireType::LengthDelimited));
        assert_eq!(WireType::from_code(5), Some(WireType::Fixed32));
        assert_eq!(WireType::from_code(3), None);
        assert_eq!(WireType::from_code(6), None);
    }

    #[test]
    fn test_read_varint_field() {
        let mut reader = FieldReader::new(vec![0x08, 0x96, 0x01]);
        let field = reader.read_field().unwrap().unwrap();
        assert_eq!(field.number, 1);
        assert_eq!(field.wire_type, WireType::Varint);
        assert_eq!(field.value, WireValue::Varint(150));
        assert_eq!(field.start_offset, 0);
        assert_eq!(field.data_offset, 1);
        assert_eq!(field.end_offset, 2);
        assert_eq!(field.raw.as_ref(), &[0x96, 0x01]);
        assert_eq!(reader.read_field().unwrap(), None);
    }

    #[test]
    fn test_read_len_field() {
        let fields = read_fields(vec![0x12, 0x03, b'a', b'b', b'c']).unwrap();
        assert_eq!(fields.len(), 1);
        let field = &fields[0];
        assert_eq!(field.number, 2);
        assert_eq!(field.data_offset, 2);
        assert_eq!(field.end_offset, 4);
        assert_eq!(field.raw.as_ref(), b"abc");
        assert_eq!(field.encoded_len(), 5);
    }

    #[test]
    fn test_read_empty_len_field() {
        let fields = read_fields(vec![0x0A, 0x00]).unwrap();
        assert_eq!(fields[0].start_offset, 0);
        assert_eq!(fields[0].data_offset, 2);
        assert_eq!(fields[0].end_offset, 1);
        assert!(fields[0].raw.is_empty());
    }

    #[test]
    fn test_read_fixed_fields() {
        let data = vec![
            0x0D, 0x01, 0x02, 0x03, 0x04, // field 1, I32
            0x11, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, // field 2, I64
        ];
        let fields = read_fields(data).unwrap();
        assert_eq!(fields[0].value, WireValue::Fixed32(0x0403_0201));
        assert_eq!(fields[0].end_offset, 4);
        assert_eq!(fields[1].value, WireValue::Fixed64(0x0807_0605_0403_0201));
        assert_eq!(fields[1].start_offset, 5);
        assert_eq!(fields[1].end_offset, 13);
    }

    #[test]
    fn test_invalid_wire_type() {
        // Field 1, wire type 3 (start group)
        let mut reader = FieldReader::new(vec![0x08, 0x01, 0x0B]);
        assert!(reader.read_field().unwrap().is_some());
        assert_eq!(
            reader.read_field(),
            Err(Error::InvalidWireType {
                offset: 2,
                wire_type: 3
            })
        );
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_invalid_field_number() {
        assert_eq!(
            read_fields(vec![0x00, 0x01]),
            Err(Error::InvalidFieldNumber {
                offset: 0,
                number: 0
            })
        );
    }

    #[test]
    fn test_truncated_len_field() {
        assert_eq!(
            read_fields(vec![0x12, 0x05, b'a', b'b']),
            Err(Error::truncated(1, 5, 2))
        );
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut reader = FieldReader::new(vec![0x08, 0x01, 0x0F, 0x08, 0x02]);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed(&Bytes::from_static(&[0x08, 0x01])));
        assert!(is_well_formed(&Bytes::new()));
        assert!(!is_well_formed(&Bytes::from_static(b"abc")));
    }
}
