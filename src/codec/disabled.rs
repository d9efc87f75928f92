//! Stand-in encoder for builds without a native codec.

use crate::audio::{EncodedPacket, Frame};
use crate::codec::{AudioEncoder, CodecError, EncoderFactory};

/// Hands out encoders that refuse every operation.
///
/// Creation itself succeeds so the failure surfaces through [`crate::codec::probe`]
/// with a single, actionable error instead of at an arbitrary later point.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEncoderFactory;

#[derive(Debug)]
struct DisabledEncoder;

impl AudioEncoder for DisabledEncoder {
    fn encode(&mut self, _frame: &Frame) -> Result<EncodedPacket, CodecError> {
        Err(CodecError::EncodingUnavailable)
    }

    fn set_bitrate(&mut self, _bitrate: i32) -> Result<(), CodecError> {
        Err(CodecError::EncodingUnavailable)
    }
}

impl EncoderFactory for DisabledEncoderFactory {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn create(&self) -> Result<Box<dyn AudioEncoder>, CodecError> {
        Ok(Box::new(DisabledEncoder))
    }
}
