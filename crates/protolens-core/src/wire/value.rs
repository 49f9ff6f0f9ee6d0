//! Decoded field payloads and their alternative interpretations.

use bytes::Bytes;
use std::fmt;

/// Payload of one field, typed by its wire type.
///
/// The wire format does not say whether a varint is signed, whether a fixed
/// value is an integer or a float, or whether a byte run is text. The
/// projection methods offer every reading; none of them is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    /// Varint payload
    Varint(u64),
    /// 64-bit fixed payload
    Fixed64(u64),
    /// Length-delimited payload
    LengthDelimited(Bytes),
    /// 32-bit fixed payload
    Fixed32(u32),
}

impl WireValue {
    /// Unsigned reading of a scalar payload
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            WireValue::Varint(v) | WireValue::Fixed64(v) => Some(v),
            WireValue::Fixed32(v) => Some(u64::from(v)),
            WireValue::LengthDelimited(_) => None,
        }
    }

    /// Two's-complement signed reading (int64 / sfixed32 / sfixed64)
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            WireValue::Varint(v) | WireValue::Fixed64(v) => Some(v as i64),
            WireValue::Fixed32(v) => Some(i64::from(v as i32)),
            WireValue::LengthDelimited(_) => None,
        }
    }

    /// Zig-zag signed reading of a varint (sint32 / sint64)
    pub fn as_zigzag(&self) -> Option<i64> {
        match *self {
            WireValue::Varint(v) => Some(((v >> 1) as i64) ^ -((v & 1) as i64)),
            _ => None,
        }
    }

    /// Boolean reading of a varint that holds 0 or 1
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            WireValue::Varint(0) => Some(false),
            WireValue::Varint(1) => Some(true),
            _ => None,
        }
    }

    /// IEEE-754 reading of a fixed-width payload
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            WireValue::Fixed64(v) => Some(f64::from_bits(v)),
            WireValue::Fixed32(v) => Some(f64::from(f32::from_bits(v))),
            _ => None,
        }
    }

    /// Raw bytes of a length-delimited payload
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            WireValue::LengthDelimited(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Display-only UTF-8 projection of a length-delimited payload
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Varint(v) | WireValue::Fixed64(v) => write!(f, "{}", v),
            WireValue::Fixed32(v) => write!(f, "{}", v),
            WireValue::LengthDelimited(bytes) => match self.as_str() {
                Some(text) => write!(f, "{:?}", text),
                None => write!(f, "<{} bytes>", bytes.len()),
            },
        }
    }
}

/// Render bytes as an array literal, e.g. `[0x61, 0x62, 0x63]`.
///
/// This is the "copy value" representation offered for any tag.
pub fn byte_array_literal(bytes: &[u8]) -> String {
    let items: Vec<String> = bytes.iter().map(|b| format!("0x{:02X}", b)).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        assert_eq!(WireValue::Varint(0).as_zigzag(), Some(0));
        assert_eq!(WireValue::Varint(1).as_zigzag(), Some(-1));
        assert_eq!(WireValue::Varint(2).as_zigzag(), Some(1));
        assert_eq!(WireValue::Varint(u64::MAX).as_zigzag(), Some(i64::MIN));
        assert_eq!(WireValue::Fixed32(1).as_zigzag(), None);
    }

    #[test]
    fn test_signed_and_float() {
        assert_eq!(WireValue::Fixed32(0xFFFF_FFFF).as_i64(), Some(-1));
        assert_eq!(WireValue::Varint(u64::MAX).as_i64(), Some(-1));
        assert_eq!(WireValue::Fixed32(1.5f32.to_bits()).as_f64(), Some(1.5));
        assert_eq!(WireValue::Fixed64(2.25f64.to_bits()).as_f64(), Some(2.25));
        assert_eq!(WireValue::Varint(1).as_f64(), None);
    }

    #[test]
    fn test_bool() {
        assert_eq!(WireValue::Varint(1).as_bool(), Some(true));
        assert_eq!(WireValue::Varint(2).as_bool(), None);
    }

    #[test]
    fn test_text_projection() {
        let value = WireValue::LengthDelimited(Bytes::from_static(b"abc"));
        assert_eq!(value.as_str(), Some("abc"));
        assert_eq!(value.to_string(), "\"abc\"");

        let value = WireValue::LengthDelimited(Bytes::from_static(&[0xFF, 0xFE]));
        assert_eq!(value.as_str(), None);
        assert_eq!(value.to_string(), "<2 bytes>");
    }

    #[test]
    fn test_byte_array_literal() {
        assert_eq!(byte_array_literal(b"ab"), "[0x61, 0x62]");
        assert_eq!(byte_array_literal(&[]), "[]");
    }
}
