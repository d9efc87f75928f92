//! # Frame Buffer
//!
//! Reassembles arbitrarily sized PCM chunks into fixed 20ms frames for the encoder.
//!
//! ## Key Features:
//! - **Exact frames only**: a frame is produced only when 1920 bytes are buffered
//! - **No padding**: short tails are never padded with silence
//! - **Remainder kept**: leftover bytes wait for the next append
//! - **Never blocks**: `extract_frame` answers immediately
//!
//! The buffer is owned by a single relay session and is not internally
//! synchronized; the relay wraps it in a mutex when two tasks touch it.

use crate::audio::{AudioChunk, FRAME_BYTES, FRAME_SAMPLES};
use byteorder::{ByteOrder, LittleEndian};

/// Exactly [`FRAME_SAMPLES`] signed 16-bit samples (20ms of mono 48kHz audio).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<i16>,
}

impl Frame {
    /// Decode one frame's worth of little-endian PCM bytes.
    ///
    /// ## Rust Concepts:
    /// - **ByteOrder::read_i16_into**: converts a byte slice into an i16 slice
    ///   in one call, respecting the declared endianness
    ///
    /// Returns `None` when `bytes` is not exactly one frame long.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FRAME_BYTES {
            return None;
        }

        let mut samples = vec![0i16; FRAME_SAMPLES];
        LittleEndian::read_i16_into(bytes, &mut samples);
        Some(Self { samples })
    }

    /// A frame of digital silence; used by the encoder capability probe.
    pub fn silent() -> Self {
        Self {
            samples: vec![0; FRAME_SAMPLES],
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Byte accumulator that turns a stream of chunks into a stream of frames.
///
/// ## Invariant:
/// After any sequence of appends totalling `L` bytes, exactly `⌊L / 1920⌋`
/// frames can be extracted and `L mod 1920` bytes remain buffered.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        // Room for a handful of frames before the first reallocation
        Self {
            pending: Vec::with_capacity(FRAME_BYTES * 10),
        }
    }

    /// Concatenate a chunk onto the tail of the accumulator.
    pub fn append(&mut self, chunk: AudioChunk) {
        if self.pending.is_empty() {
            // Nothing buffered: take the chunk's allocation instead of copying
            let bytes = chunk.into_bytes();
            if bytes.capacity() >= self.pending.capacity() {
                self.pending = bytes;
                return;
            }
            self.pending.extend_from_slice(&bytes);
        } else {
            self.pending.extend_from_slice(chunk.as_bytes());
        }
    }

    /// Remove and return one frame from the head of the accumulator.
    ///
    /// Returns `None` ("insufficient data") when fewer than 1920 bytes are
    /// buffered; the buffered bytes are left untouched in that case.
    pub fn extract_frame(&mut self) -> Option<Frame> {
        if self.pending.len() < FRAME_BYTES {
            return None;
        }

        let frame = Frame::from_le_bytes(&self.pending[..FRAME_BYTES]);
        self.pending.drain(..FRAME_BYTES);
        frame
    }

    /// Number of whole frames currently extractable.
    pub fn frames_available(&self) -> usize {
        self.pending.len() / FRAME_BYTES
    }

    /// Bytes currently buffered (including any partial frame).
    pub fn buffered_bytes(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_of(len: usize) -> AudioChunk {
        AudioChunk::new((0..len).map(|i| (i % 251) as u8).collect())
    }

    #[test]
    fn test_three_chunks_yield_one_frame_and_remainder() {
        let mut buffer = FrameBuffer::new();
        buffer.append(chunk_of(500));
        buffer.append(chunk_of(500));
        buffer.append(chunk_of(1000));

        assert!(buffer.extract_frame().is_some());
        assert!(buffer.extract_frame().is_none());
        assert_eq!(buffer.buffered_bytes(), 80);
    }

    #[test]
    fn test_frame_count_is_floor_of_total_length() {
        let cases: &[&[usize]] = &[
            &[],
            &[1],
            &[1919],
            &[1920],
            &[1921],
            &[3, 3837],
            &[4000, 4000, 4000],
            &[7, 1913, 1920, 1, 1919, 960, 960],
        ];

        for sizes in cases {
            let mut buffer = FrameBuffer::new();
            let total: usize = sizes.iter().sum();
            for &size in sizes.iter() {
                buffer.append(chunk_of(size));
            }

            let mut frames = 0;
            while let Some(frame) = buffer.extract_frame() {
                assert_eq!(frame.len(), FRAME_SAMPLES);
                frames += 1;
            }

            assert_eq!(frames, total / FRAME_BYTES, "sizes {:?}", sizes);
            assert_eq!(buffer.buffered_bytes(), total % FRAME_BYTES, "sizes {:?}", sizes);
        }
    }

    #[test]
    fn test_insufficient_data_leaves_buffer_untouched() {
        let mut buffer = FrameBuffer::new();
        buffer.append(chunk_of(1919));

        assert_eq!(buffer.frames_available(), 0);
        assert!(buffer.extract_frame().is_none());
        assert_eq!(buffer.buffered_bytes(), 1919);

        buffer.append(chunk_of(1));
        assert_eq!(buffer.frames_available(), 1);
        assert!(buffer.extract_frame().is_some());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_samples_are_little_endian_and_in_order() {
        let mut bytes = Vec::with_capacity(FRAME_BYTES);
        for i in 0..FRAME_SAMPLES as i16 {
            bytes.extend_from_slice(&(i - 480).to_le_bytes());
        }

        // Split mid-sample to make sure byte order survives chunk boundaries
        let mut buffer = FrameBuffer::new();
        buffer.append(AudioChunk::new(bytes[..777].to_vec()));
        buffer.append(AudioChunk::new(bytes[777..].to_vec()));

        let frame = buffer.extract_frame().unwrap();
        assert_eq!(frame.samples()[0], -480);
        assert_eq!(frame.samples()[480], 0);
        assert_eq!(frame.samples()[959], 479);
    }

    #[test]
    fn test_remainder_is_prefix_of_next_frame() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = vec![0u8; FRAME_BYTES + 2];
        bytes[FRAME_BYTES..].copy_from_slice(&i16::MIN.to_le_bytes());
        buffer.append(AudioChunk::new(bytes));
        buffer.extract_frame().unwrap();

        buffer.append(AudioChunk::new(vec![0u8; FRAME_BYTES - 2]));
        let frame = buffer.extract_frame().unwrap();
        assert_eq!(frame.samples()[0], i16::MIN);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_frame_from_wrong_length_is_rejected() {
        assert!(Frame::from_le_bytes(&[0u8; 10]).is_none());
        assert_eq!(Frame::silent().samples().iter().filter(|s| **s != 0).count(), 0);
    }
}
