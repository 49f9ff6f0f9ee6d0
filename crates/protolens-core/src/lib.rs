//! # protolens-core
//!
//! A library for inspecting Protocol Buffer messages without a schema.
//!
//! This crate provides the core functionality for:
//! - Parsing raw protobuf wire format data into a navigable tag tree
//! - Expanding length-delimited fields into embedded messages on demand
//! - Inferring a `.proto` schema from a decoded tree
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`wire`]: Wire format primitives (varints, field headers, values)
//! - [`decoder`]: Top-level parsing entry point
//! - [`tree`]: The tag tree, on-demand decoding and offset computation
//! - [`infer`]: Heuristics for classifying length-delimited payloads
//! - [`schema`]: Schema inference and `.proto` rendering
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use protolens_core::{parse, write_schema};
//!
//! // field 1 = 150, field 2 = { field 1 = 1 }
//! let data = vec![0x08, 0x96, 0x01, 0x12, 0x02, 0x08, 0x01];
//!
//! let mut message = parse(data)?;
//! let embedded = message.decode_tag(message.roots()[1])?;
//! assert_eq!(message.get(embedded)?.name(), "EmbeddedMessage2");
//!
//! println!("{}", write_schema(&message));
//! # Ok::<(), protolens_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! [`TagVisitor`] walks a tree without recursion; implement it to render or
//! summarise messages in custom ways.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decoder;
pub mod error;
pub mod infer;
pub mod schema;
pub mod tree;
pub mod wire;

// Re-export primary types for convenience
pub use decoder::{parse, Decoder, DecoderConfig};
pub use error::{Error, Result};
pub use infer::PayloadKind;
pub use schema::{write_schema, InferredSchema, ProtoSyntax, SchemaConfig, SchemaWriter};
pub use tree::{
    ByteSpan, EmbeddedMessageTag, Message, RepeatedTag, SingleTag, Tag, TagId, TagKind, TagStats,
    TagVisitor,
};
pub use wire::{WireType, WireValue};

/// Result of parsing a top-level buffer
pub type ParseResult = Result<Message>;

/// Result of expanding a tag: the id of the new embedded message
pub type DecodeResult = Result<TagId>;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
