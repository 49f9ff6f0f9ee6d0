//! Error types for the protolens-core library.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side
//! carries a specific failure reason. Decoding never panics on malformed
//! input; the `Display` text of an [`Error`] is the stable, human-readable
//! reason shown to users.

use crate::tree::TagId;
use thiserror::Error;

/// Result type alias for protolens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all protolens operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The buffer ended in the middle of a read
    #[error("truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        /// Byte offset where the failed read started
        offset: usize,
        /// Number of bytes the read required
        needed: usize,
        /// Number of bytes left in the buffer
        available: usize,
    },

    /// A varint kept its continuation bit set past the tenth byte
    #[error("varint at offset {offset} exceeds 10 bytes")]
    VarintOverflow {
        /// Byte offset where the varint started
        offset: usize,
    },

    /// A field header used a wire type outside varint/fixed64/length-delimited/fixed32
    #[error("invalid wire type {wire_type} at offset {offset}")]
    InvalidWireType {
        /// Byte offset of the field header
        offset: usize,
        /// The offending wire-type code
        wire_type: u8,
    },

    /// A field header carried field number 0 or one above the protobuf maximum
    #[error("invalid field number {number} at offset {offset}")]
    InvalidFieldNumber {
        /// Byte offset of the field header
        offset: usize,
        /// The decoded field number
        number: u64,
    },

    /// On-demand decode was requested on a tag whose payload is not a message
    #[error("tag {index} can't be decoded as an embedded message")]
    NotDecodable {
        /// Field number of the tag
        index: u32,
    },

    /// On-demand decode found no container to splice the result into
    #[error("tag {index} has no parent container to splice into")]
    NoParentContext {
        /// Field number of the tag
        index: u32,
    },

    /// Decoding would nest messages deeper than the configured limit
    #[error("nesting depth {depth} exceeds the maximum of {max}")]
    NestingTooDeep {
        /// Depth the new node would have
        depth: usize,
        /// Configured maximum depth
        max: usize,
    },

    /// The tag id does not belong to this message
    #[error("unknown tag {0}")]
    UnknownTag(TagId),

    /// A tag path could not be parsed or resolved
    #[error("invalid tag path '{path}': {reason}")]
    InvalidTagPath {
        /// The path as given
        path: String,
        /// Why it failed
        reason: String,
    },

    /// The inferred schema could not be turned into a descriptor pool
    #[error("failed to build descriptor: {0}")]
    DescriptorBuild(String),

    /// Any other internal fault
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Creates a new truncation error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::Truncated {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new tag path error
    pub fn invalid_tag_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTagPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Creates a new unexpected error
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Human-readable failure reason
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Returns true if the error came from malformed wire data
    pub fn is_wire_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::VarintOverflow { .. }
                | Self::InvalidWireType { .. }
                | Self::InvalidFieldNumber { .. }
        )
    }
}
