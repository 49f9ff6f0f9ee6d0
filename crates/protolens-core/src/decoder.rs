//! Top-level decoding entry point.
//!
//! [`Decoder`] turns a raw buffer into a [`Message`]. Parsing is
//! all-or-nothing: any malformed field fails the whole call and no partial
//! tree is returned.

use crate::tree::Message;
use crate::wire;
use crate::ParseResult;
use bytes::Bytes;
use tracing::debug;

/// Default limit on embedded-message nesting
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// Configuration for the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum embedded-message nesting reachable through on-demand decode
    pub max_nesting_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }
}

/// Schema-less protobuf decoder
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    /// Creates a new decoder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new decoder with custom configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes `data` as a top-level message
    pub fn parse(&self, data: impl Into<Bytes>) -> ParseResult {
        let data = data.into();
        debug!("Parsing {} bytes", data.len());

        let fields = wire::read_fields(data.clone()).map_err(|e| {
            debug!("Parse failed: {}", e);
            e
        })?;

        let message = Message::from_fields(data, fields, self.config.max_nesting_depth);
        debug!("Parsed {} top-level tags", message.len());
        Ok(message)
    }
}

/// Decodes `data` with the default configuration
pub fn parse(data: impl Into<Bytes>) -> ParseResult {
    Decoder::new().parse(data)
}
