//! The decoded tag tree.
//!
//! A [`Message`] owns an arena of [`Tag`] nodes addressed by [`TagId`].
//! Containers hold ordered lists of child ids and every tag records its
//! parent id, so the tree can be walked in both directions without owning
//! cycles.
//!
//! ## Offsets
//!
//! Offsets stored on a tag are relative to the buffer that tag was read
//! from: the top-level input for root tags, the payload of the enclosing
//! embedded message otherwise. [`Message::absolute_span`] sums the
//! contributions of the ancestors to produce input-level positions.

mod message;
mod visit;

use crate::wire::{WireType, WireValue};
use bytes::Bytes;
use std::fmt;

pub use message::Message;
pub use visit::{TagStats, TagVisitor};

/// Stable handle to a tag inside one [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub(crate) usize);

impl TagId {
    /// Arena slot of this tag
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inclusive byte range `start..=end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteSpan {
    /// First byte
    pub start: usize,
    /// Last byte
    pub end: usize,
}

impl ByteSpan {
    /// Creates a span covering `start..=end`
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Number of bytes covered
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Spans always cover at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The same span moved forward by `base` bytes
    pub fn shifted(self, base: usize) -> Self {
        Self::new(self.start + base, self.end + base)
    }
}

impl fmt::Display for ByteSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// One node of the tag tree
#[derive(Debug, Clone)]
pub struct Tag {
    pub(crate) index: u32,
    pub(crate) name: String,
    pub(crate) is_optional: bool,
    pub(crate) parent: Option<TagId>,
    pub(crate) detached: bool,
    pub(crate) kind: TagKind,
}

/// The three shapes a tag can take
#[derive(Debug, Clone)]
pub enum TagKind {
    /// One field occurrence
    Single(SingleTag),
    /// Every occurrence of a field number that appeared more than once
    Repeated(RepeatedTag),
    /// A length-delimited field re-read as a nested message
    Embedded(EmbeddedMessageTag),
}

/// One decoded field occurrence
#[derive(Debug, Clone)]
pub struct SingleTag {
    /// Wire type from the field header
    pub wire_type: WireType,
    /// Decoded payload
    pub value: WireValue,
    /// Payload bytes as encoded
    pub raw: Bytes,
    /// Whether the payload re-parses as a message
    pub can_decode: bool,
    /// First header byte
    pub start_offset: usize,
    /// First payload byte
    pub data_offset: usize,
    /// Last payload byte
    pub end_offset: usize,
}

impl SingleTag {
    /// Span of the whole field, header included
    pub fn span(&self) -> ByteSpan {
        ByteSpan::new(self.start_offset, self.end_offset)
    }

    /// Display-only text view of a length-delimited payload
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Logical grouping of repeated occurrences; has no span of its own
#[derive(Debug, Clone, Default)]
pub struct RepeatedTag {
    /// Occurrences in wire order
    pub items: Vec<TagId>,
}

/// A length-delimited field whose payload was decoded as a message
#[derive(Debug, Clone)]
pub struct EmbeddedMessageTag {
    /// First header byte of the replaced field
    pub start_offset: usize,
    /// First payload byte; child offsets are relative to it
    pub data_offset: usize,
    /// Last payload byte
    pub end_offset: usize,
    /// The payload the children were decoded from
    pub payload: Bytes,
    /// Child tags in wire order
    pub tags: Vec<TagId>,
}

impl EmbeddedMessageTag {
    /// Span of the whole field, header included
    pub fn span(&self) -> ByteSpan {
        ByteSpan::new(self.start_offset, self.end_offset)
    }
}

impl Tag {
    /// Field number
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Display name; defaults to `Field<N>` or `EmbeddedMessage<N>`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the field is marked optional in the inferred schema
    pub fn is_optional(&self) -> bool {
        self.is_optional
    }

    /// Enclosing tag, or `None` at the top level
    pub fn parent(&self) -> Option<TagId> {
        self.parent
    }

    /// True once the tag has been replaced by an embedded message
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Variant data
    pub fn kind(&self) -> &TagKind {
        &self.kind
    }

    /// Single-tag data, if this is a single tag
    pub fn as_single(&self) -> Option<&SingleTag> {
        match &self.kind {
            TagKind::Single(single) => Some(single),
            _ => None,
        }
    }

    /// Children of a repeated or embedded tag; empty for single tags
    pub fn children(&self) -> &[TagId] {
        match &self.kind {
            TagKind::Single(_) => &[],
            TagKind::Repeated(repeated) => &repeated.items,
            TagKind::Embedded(embedded) => &embedded.tags,
        }
    }

    /// Whether on-demand decode can expand this tag
    pub fn can_decode(&self) -> bool {
        matches!(&self.kind, TagKind::Single(single) if single.can_decode)
    }

    /// Span within the containing buffer; repeated tags have none
    pub fn span(&self) -> Option<ByteSpan> {
        match &self.kind {
            TagKind::Single(single) => Some(single.span()),
            TagKind::Repeated(_) => None,
            TagKind::Embedded(embedded) => Some(embedded.span()),
        }
    }

    /// Offset this tag adds to the positions of its children
    pub(crate) fn child_base(&self) -> usize {
        match &self.kind {
            TagKind::Single(single) => single.start_offset,
            TagKind::Repeated(_) => 0,
            TagKind::Embedded(embedded) => embedded.data_offset,
        }
    }

    /// Short variant name used in listings
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            TagKind::Single(_) => "single",
            TagKind::Repeated(_) => "repeated",
            TagKind::Embedded(_) => "embedded",
        }
    }
}
