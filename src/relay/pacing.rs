//! # Pacing Tasks
//!
//! The two background tasks that run while a session is streaming:
//!
//! - **drain**: pops chunks from the ingestion queue as soon as they arrive and
//!   appends them to the shared [`FrameBuffer`]
//! - **pacer**: waits for the sink to become ready, then on every 20ms tick
//!   extracts at most one frame, encodes it and offers the packet to the sink
//!   without blocking
//!
//! Both observe one [`CancellationToken`]. [`PacingHandle::stop`] cancels it and
//! waits for both tasks, so by the time it returns the speaking indicator is off
//! and the encoder has been dropped.

use crate::audio::{EncodedPacket, FrameBuffer, FRAME_DURATION};
use crate::codec::AudioEncoder;
use crate::ingest::AudioQueue;
use crate::relay::RelayStats;
use crate::voice::VoiceConnection;

use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Handles to the running pacing tasks of one streaming session.
pub struct PacingHandle {
    cancel: CancellationToken,
    pacer: JoinHandle<()>,
    drain: JoinHandle<()>,
}

impl PacingHandle {
    /// Launch the drain and pacer tasks.
    pub fn spawn(
        queue: Arc<AudioQueue>,
        connection: Arc<dyn VoiceConnection>,
        encoder: Box<dyn AudioEncoder>,
        stats: Arc<RelayStats>,
        initial_delay: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let buffer = Arc::new(Mutex::new(FrameBuffer::new()));

        let drain = tokio::spawn(drain_queue(
            queue,
            buffer.clone(),
            stats.clone(),
            cancel.clone(),
        ));

        let pacer = tokio::spawn(pace_frames(
            connection,
            encoder,
            buffer,
            stats,
            initial_delay,
            cancel.clone(),
        ));

        Self {
            cancel,
            pacer,
            drain,
        }
    }

    /// Signal both tasks and wait until they have exited.
    pub async fn stop(self) {
        self.cancel.cancel();

        if let Err(err) = self.pacer.await {
            error!("Pacing task ended abnormally: {}", err);
        }
        if let Err(err) = self.drain.await {
            error!("Queue drain task ended abnormally: {}", err);
        }
    }
}

async fn drain_queue(
    queue: Arc<AudioQueue>,
    buffer: Arc<Mutex<FrameBuffer>>,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
) {
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = queue.pop() => chunk,
        };

        stats.chunks_buffered.fetch_add(1, Ordering::Relaxed);
        buffer.lock().append(chunk);
    }

    debug!("Queue drain task stopped");
}

async fn pace_frames(
    connection: Arc<dyn VoiceConnection>,
    mut encoder: Box<dyn AudioEncoder>,
    buffer: Arc<Mutex<FrameBuffer>>,
    stats: Arc<RelayStats>,
    initial_delay: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Streaming stopped before the voice session became ready");
            return;
        }
        _ = connection.ready() => {}
    }

    connection.set_speaking(true);
    let sender = connection.packet_sender();
    info!("Relay started sending audio");

    let mut ticker = interval_at(Instant::now() + initial_delay, FRAME_DURATION);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let frame = buffer.lock().extract_frame();
        let Some(frame) = frame else {
            continue;
        };

        match encoder.encode(&frame) {
            Ok(packet) => offer_packet(&sender, packet, &stats),
            Err(err) => {
                stats.encode_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping frame after encode failure: {}", err);
            }
        }
    }

    connection.set_speaking(false);
    drop(encoder);
    info!("Relay stopped sending audio");
}

/// Non-blocking hand-off to the sink. A full channel drops the packet.
fn offer_packet(sender: &Sender<EncodedPacket>, packet: EncodedPacket, stats: &RelayStats) {
    match sender.try_send(packet) {
        Ok(()) => {
            stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(TrySendError::Full(_)) => {
            stats.frames_dropped_sink_full.fetch_add(1, Ordering::Relaxed);
            trace!("Voice sink busy, dropping packet");
        }
        Err(TrySendError::Closed(_)) => {
            stats.frames_dropped_sink_full.fetch_add(1, Ordering::Relaxed);
            debug!("Voice sink channel closed, dropping packet");
        }
    }
}
