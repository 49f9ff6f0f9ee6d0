//! Position-aware reader over a shared byte buffer.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes};

/// Maximum encoded length of a 64-bit varint
pub const MAX_VARINT_LEN: usize = 10;

/// Decode a varint from the start of `data`.
///
/// Returns the decoded value and the number of bytes consumed. Offsets in
/// the returned errors are relative to `data`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    decode_varint_at(data, 0)
}

/// Decode a varint starting at `start`, reporting absolute offsets on failure.
fn decode_varint_at(data: &[u8], start: usize) -> Result<(u64, usize)> {
    let input = data.get(start..).unwrap_or_default();
    let mut value: u64 = 0;

    for (i, &byte) in input.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte carries only bit 63
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(Error::VarintOverflow { offset: start });
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    Err(Error::truncated(start, input.len() + 1, input.len()))
}

/// Sequential reader over an immutable byte buffer.
///
/// Reads advance the position only when they succeed, so a failed read
/// leaves the cursor exactly where it was. Error offsets are absolute
/// positions within the cursor's buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Bytes,
    position: usize,
}

impl ByteCursor {
    /// Creates a cursor positioned at the start of `data`
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Returns true once every byte has been consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The whole underlying buffer
    pub fn get_ref(&self) -> &Bytes {
        &self.data
    }

    /// Moves the read position back to an earlier, already validated offset
    pub(crate) fn rewind(&mut self, position: usize) {
        debug_assert!(position <= self.position);
        self.position = position;
    }

    /// Reads a varint, returning its value and encoded length
    pub fn read_varint(&mut self) -> Result<(u64, usize)> {
        let (value, len) = decode_varint_at(&self.data, self.position)?;
        self.position += len;
        Ok((value, len))
    }

    /// Reads a little-endian 32-bit value
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let mut slice = self.take(4)?;
        Ok(slice.get_u32_le())
    }

    /// Reads a little-endian 64-bit value
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let mut slice = self.take(8)?;
        Ok(slice.get_u64_le())
    }

    /// Reads a varint length prefix followed by that many bytes.
    ///
    /// The returned slice shares the cursor's buffer.
    pub fn read_length_delimited(&mut self) -> Result<Bytes> {
        let start = self.position;
        let (length, prefix_len) = decode_varint_at(&self.data, start)?;
        let data_start = start + prefix_len;
        let available = self.data.len() - data_start;

        let length = usize::try_from(length)
            .ok()
            .filter(|&len| len <= available)
            .ok_or_else(|| {
                Error::truncated(start, usize::try_from(length).unwrap_or(usize::MAX), available)
            })?;

        let payload = self.data.slice(data_start..data_start + length);
        self.position = data_start + length;
        Ok(payload)
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        let start = self.position;
        if self.remaining() < count {
            return Err(Error::truncated(start, count, self.remaining()));
        }
        self.position += count;
        Ok(&self.data[start..start + count])
    }
}
