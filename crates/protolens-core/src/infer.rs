//! Heuristic classification of length-delimited payloads.
//!
//! A length-delimited payload may hold text, opaque bytes or an embedded
//! message, and the wire format does not say which. A payload is considered
//! decodable when the field parser consumes all of it without an error.
//! Text that happens to tokenize as fields passes this test too; such false
//! positives are accepted; no stricter check is applied.
//!
//! When a payload is both decodable and valid UTF-8, [`classify`] prefers
//! [`PayloadKind::Message`].

use crate::wire;
use bytes::Bytes;
use std::fmt;

/// Most plausible interpretation of a length-delimited payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Parses completely as a sequence of fields
    Message,
    /// Valid UTF-8 that does not parse as a message
    Text,
    /// Anything else
    Bytes,
}

impl PayloadKind {
    /// Short display name
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Message => "message",
            PayloadKind::Text => "text",
            PayloadKind::Bytes => "bytes",
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `payload` can be re-parsed as an embedded message.
///
/// An empty payload qualifies: it is an embedded message with no fields.
pub fn can_decode(payload: &Bytes) -> bool {
    wire::is_well_formed(payload)
}

/// Returns true if `payload` is valid UTF-8
pub fn is_text(payload: &[u8]) -> bool {
    std::str::from_utf8(payload).is_ok()
}

/// Picks one interpretation for `payload`
pub fn classify(payload: &Bytes) -> PayloadKind {
    if can_decode(payload) {
        PayloadKind::Message
    } else if is_text(payload) {
        PayloadKind::Text
    } else {
        PayloadKind::Bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_decodable() {
        let payload = Bytes::from_static(b"abc");
        assert!(!can_decode(&payload));
        assert_eq!(classify(&payload), PayloadKind::Text);
    }

    #[test]
    fn test_nested_message() {
        // field 1 = 150
        let payload = Bytes::from_static(&[0x08, 0x96, 0x01]);
        assert!(can_decode(&payload));
        assert_eq!(classify(&payload), PayloadKind::Message);
    }

    #[test]
    fn test_text_false_positive_is_kept() {
        // "(a" reads as field 5 varint 0x61
        let payload = Bytes::from_static(b"(a");
        assert!(is_text(&payload));
        assert_eq!(classify(&payload), PayloadKind::Message);
    }

    #[test]
    fn test_binary_bytes() {
        let payload = Bytes::from_static(&[0xFF, 0xFF]);
        assert_eq!(classify(&payload), PayloadKind::Bytes);
    }

    #[test]
    fn test_empty_payload_is_decodable() {
        let payload = Bytes::new();
        assert!(can_decode(&payload));
        assert_eq!(classify(&payload), PayloadKind::Message);
    }
}
