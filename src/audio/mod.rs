//! # Audio Data Model
//!
//! Types that flow through the relay pipeline, in the order they appear:
//!
//! producer → [`AudioChunk`] → [`FrameBuffer`] → [`Frame`] → encoder → [`EncodedPacket`] → voice sink
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 48kHz (48,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//! - **Frame**: 960 samples = 20ms = 1920 bytes

pub mod frame;    // Fixed-size frame extraction from arbitrary chunks

pub use frame::{Frame, FrameBuffer};

use std::time::Duration;

/// Sample rate expected from the producer and fed to the encoder.
pub const SAMPLE_RATE: u32 = 48_000;

/// Mono audio only.
pub const CHANNELS: u8 = 1;

/// Bytes per 16-bit PCM sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Samples in one 20ms frame at 48kHz.
pub const FRAME_SAMPLES: usize = 960;

/// Bytes in one frame (960 samples × 2 bytes).
pub const FRAME_BYTES: usize = FRAME_SAMPLES * BYTES_PER_SAMPLE;

/// Wall-clock duration of one frame; also the pacing tick.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// A raw slice of 16-bit little-endian mono PCM as received from the producer.
///
/// The length is arbitrary (it need not be a multiple of the frame size, or
/// even of the sample size). Chunks are immutable once received and are moved
/// into the [`FrameBuffer`] on ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    bytes: Vec<u8>,
}

impl AudioChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Give up ownership of the underlying bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Compressed output of encoding exactly one [`Frame`].
///
/// Opaque to the relay: it is handed to the voice sink as-is and consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket(Vec<u8>);

impl EncodedPacket {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}
