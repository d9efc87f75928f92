//! # Codec Adapter
//!
//! Capability-gated interface to the voice encoder. One [`Frame`] in, one
//! [`EncodedPacket`] out, fixed at mono / 48kHz.
//!
//! ## Capability Selection:
//! Whether a real encoder exists is a property of the compiled binary, not of
//! the runtime. The `opus` cargo feature links libopus; without it the
//! [`DisabledEncoderFactory`] is the only implementation and every encode
//! fails with [`CodecError::EncodingUnavailable`].
//!
//! Callers never pick an implementation themselves. They receive an
//! `Arc<dyn EncoderFactory>` (normally [`default_encoder_factory`]) and run
//! [`probe`] once at startup so a binary without codec support fails fast.

pub mod disabled;
#[cfg(feature = "opus")]
pub mod opus;

pub use disabled::DisabledEncoderFactory;
#[cfg(feature = "opus")]
pub use self::opus::OpusEncoderFactory;

use crate::audio::{EncodedPacket, Frame};
use std::sync::Arc;
use thiserror::Error;

/// Default target bitrate in bits per second.
pub const DEFAULT_BITRATE: i32 = 128_000;

/// Upper bound on the size of one encoded packet.
pub const MAX_PACKET_BYTES: usize = 4000;

/// Errors raised by the codec layer.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The binary was built without a usable encoder.
    #[error("audio encoding is unavailable in this build (rebuild with the `opus` feature and libopus installed)")]
    EncodingUnavailable,

    /// The encoder rejected a frame.
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// The frame did not have the sample count the encoder was configured for.
    #[error("invalid frame: expected {expected} samples, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    /// The encoder refused a bitrate change.
    #[error("failed to set bitrate: {0}")]
    Bitrate(String),
}

/// A single encoder instance owned by one streaming session.
///
/// Encoders are stateful (they carry prediction state between frames), so an
/// instance is never shared: it is created on `StartStreaming` and dropped when
/// the pacing task exits.
pub trait AudioEncoder: Send {
    /// Encode exactly one frame.
    fn encode(&mut self, frame: &Frame) -> Result<EncodedPacket, CodecError>;

    /// Change the target bitrate in bits per second.
    fn set_bitrate(&mut self, bitrate: i32) -> Result<(), CodecError>;
}

/// Creates encoders. This is the seam where build-time capability is injected.
pub trait EncoderFactory: Send + Sync {
    /// Short name for logs ("opus", "disabled", ...).
    fn name(&self) -> &'static str;

    /// Build a fresh encoder for mono 48kHz audio.
    fn create(&self) -> Result<Box<dyn AudioEncoder>, CodecError>;
}

/// The factory matching what this binary was compiled with.
pub fn default_encoder_factory() -> Arc<dyn EncoderFactory> {
    #[cfg(feature = "opus")]
    {
        Arc::new(OpusEncoderFactory)
    }

    #[cfg(not(feature = "opus"))]
    {
        Arc::new(DisabledEncoderFactory)
    }
}

/// Check that the factory can actually encode by pushing one silent frame
/// through a throwaway encoder.
pub fn probe(factory: &dyn EncoderFactory) -> Result<(), CodecError> {
    let mut encoder = factory.create()?;
    let packet = encoder.encode(&Frame::silent())?;
    tracing::debug!(
        codec = factory.name(),
        packet_bytes = packet.len(),
        "Encoder capability probe succeeded"
    );
    Ok(())
}

/// Build an encoder for a streaming session and apply the bitrate.
///
/// A refused bitrate is logged and ignored; the encoder keeps its default.
pub fn prepare_encoder(
    factory: &dyn EncoderFactory,
    bitrate: i32,
) -> Result<Box<dyn AudioEncoder>, CodecError> {
    let mut encoder = factory.create()?;
    if let Err(err) = encoder.set_bitrate(bitrate) {
        tracing::warn!(codec = factory.name(), bitrate, "Ignoring bitrate error: {}", err);
    }
    Ok(encoder)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Deterministic encoders for exercising the relay without libopus.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits the first sample of each frame as a 2-byte packet, so tests can
    /// tell which frame a packet came from.
    pub struct MarkerEncoderFactory {
        /// Every encode whose 1-based index is a multiple of this fails.
        pub fail_every: Option<usize>,
        pub created: AtomicUsize,
        pub bitrate_fails: bool,
    }

    impl MarkerEncoderFactory {
        pub fn new() -> Self {
            Self {
                fail_every: None,
                created: AtomicUsize::new(0),
                bitrate_fails: false,
            }
        }
    }

    struct MarkerEncoder {
        fail_every: Option<usize>,
        encoded: usize,
        bitrate_fails: bool,
    }

    impl AudioEncoder for MarkerEncoder {
        fn encode(&mut self, frame: &Frame) -> Result<EncodedPacket, CodecError> {
            self.encoded += 1;
            if let Some(n) = self.fail_every {
                if self.encoded % n == 0 {
                    return Err(CodecError::Encode("synthetic failure".to_string()));
                }
            }
            Ok(EncodedPacket::new(frame.samples()[0].to_le_bytes().to_vec()))
        }

        fn set_bitrate(&mut self, _bitrate: i32) -> Result<(), CodecError> {
            if self.bitrate_fails {
                return Err(CodecError::Bitrate("synthetic".to_string()));
            }
            Ok(())
        }
    }

    impl EncoderFactory for MarkerEncoderFactory {
        fn name(&self) -> &'static str {
            "marker"
        }

        fn create(&self) -> Result<Box<dyn AudioEncoder>, CodecError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MarkerEncoder {
                fail_every: self.fail_every,
                encoded: 0,
                bitrate_fails: self.bitrate_fails,
            }))
        }
    }
}
