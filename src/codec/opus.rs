//! # Opus Encoder
//!
//! libopus-backed encoder via the `opus` crate. Configured for music rather
//! than speech (`Application::Audio`) since the producer relays a browser tab.

use crate::audio::{EncodedPacket, Frame, FRAME_SAMPLES, SAMPLE_RATE};
use crate::codec::{AudioEncoder, CodecError, EncoderFactory, MAX_PACKET_BYTES};

/// Builds mono 48kHz Opus encoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpusEncoderFactory;

pub struct OpusEncoder {
    encoder: ::opus::Encoder,
    /// Scratch space reused across frames; trimmed copies are handed out.
    output: Vec<u8>,
}

impl OpusEncoder {
    pub fn new() -> Result<Self, CodecError> {
        let encoder = ::opus::Encoder::new(SAMPLE_RATE, ::opus::Channels::Mono, ::opus::Application::Audio)
            .map_err(|e| CodecError::Encode(format!("encoder init: {}", e)))?;

        Ok(Self {
            encoder,
            output: vec![0u8; MAX_PACKET_BYTES],
        })
    }
}

impl AudioEncoder for OpusEncoder {
    fn encode(&mut self, frame: &Frame) -> Result<EncodedPacket, CodecError> {
        if frame.len() != FRAME_SAMPLES {
            return Err(CodecError::InvalidFrame {
                expected: FRAME_SAMPLES,
                actual: frame.len(),
            });
        }

        let written = self
            .encoder
            .encode(frame.samples(), &mut self.output)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        Ok(EncodedPacket::new(self.output[..written].to_vec()))
    }

    fn set_bitrate(&mut self, bitrate: i32) -> Result<(), CodecError> {
        self.encoder
            .set_bitrate(::opus::Bitrate::Bits(bitrate))
            .map_err(|e| CodecError::Bitrate(e.to_string()))
    }
}

impl EncoderFactory for OpusEncoderFactory {
    fn name(&self) -> &'static str {
        "opus"
    }

    fn create(&self) -> Result<Box<dyn AudioEncoder>, CodecError> {
        Ok(Box::new(OpusEncoder::new()?))
    }
}
