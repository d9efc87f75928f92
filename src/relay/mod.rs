//! # Voice Relay
//!
//! Owns the voice-session lifecycle and the streaming state machine:
//!
//! ```text
//! Idle --connect--> Connected --start_streaming--> Streaming
//!  ^                 |    ^                            |
//!  +---disconnect----+    +------stop_streaming--------+
//! ```
//!
//! `disconnect` from `Streaming` stops the pacing tasks first, then leaves the
//! voice session.
//!
//! ## Synchronization:
//! Every transition runs under one `tokio::sync::Mutex`, so `connect`,
//! `disconnect`, `start_streaming` and `stop_streaming` never interleave. The
//! resulting [`RelayStatus`] is published through a `watch` channel for
//! lock-free reads (status endpoint, ingestion `status` replies, orchestrator).

pub mod pacing;

pub use pacing::PacingHandle;

use crate::codec::{self, CodecError, EncoderFactory};
use crate::ingest::AudioQueue;
use crate::voice::{VoiceConnection, VoiceGateway};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// Errors returned by relay lifecycle operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("audio is already streaming")]
    AlreadyStreaming,

    #[error("already connected to a voice channel; disconnect first")]
    AlreadyConnected,

    #[error("failed to join voice channel: {0}")]
    SessionEstablishmentFailed(String),

    #[error("failed to leave voice channel: {0}")]
    LeaveFailed(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Relay settings taken from the application configuration.
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub bitrate: i32,
    /// Delay before the first pacing tick
    pub initial_delay: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bitrate: codec::DEFAULT_BITRATE,
            initial_delay: Duration::from_millis(20),
        }
    }
}

/// Published view of the relay state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub connected: bool,
    pub streaming: bool,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
}

/// Relay counters, shared with the pacing tasks.
#[derive(Debug, Default)]
pub struct RelayStats {
    pub frames_sent: AtomicU64,
    pub frames_dropped_sink_full: AtomicU64,
    pub encode_failures: AtomicU64,
    pub chunks_buffered: AtomicU64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped_sink_full: self.frames_dropped_sink_full.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            chunks_buffered: self.chunks_buffered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatsSnapshot {
    pub frames_sent: u64,
    pub frames_dropped_sink_full: u64,
    pub encode_failures: u64,
    pub chunks_buffered: u64,
}

/// A joined voice session and, while streaming, its pacing tasks.
struct Session {
    connection: Arc<dyn VoiceConnection>,
    guild_id: String,
    channel_id: String,
    pacing: Option<PacingHandle>,
}

pub struct VoiceRelay {
    gateway: Arc<dyn VoiceGateway>,
    encoders: Arc<dyn EncoderFactory>,
    settings: RelaySettings,
    session: Mutex<Option<Session>>,
    status: watch::Sender<RelayStatus>,
    connected: watch::Sender<bool>,
    stats: Arc<RelayStats>,
}

impl VoiceRelay {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        encoders: Arc<dyn EncoderFactory>,
        settings: RelaySettings,
    ) -> Self {
        let (status, _) = watch::channel(RelayStatus::default());
        let (connected, _) = watch::channel(false);

        Self {
            gateway,
            encoders,
            settings,
            session: Mutex::new(None),
            status,
            connected,
            stats: Arc::new(RelayStats::default()),
        }
    }

    /// Join the destination channel.
    ///
    /// Rejected with [`RelayError::AlreadyConnected`] while a session exists.
    /// A failed join leaves the relay untouched.
    pub async fn connect(
        &self,
        credential: &str,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<(), RelayError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(RelayError::AlreadyConnected);
        }

        let connection = self
            .gateway
            .join(credential, guild_id, channel_id)
            .await
            .map_err(|err| RelayError::SessionEstablishmentFailed(format!("{:#}", err)))?;

        *session = Some(Session {
            connection,
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            pacing: None,
        });
        self.publish(&session);

        info!(guild_id, channel_id, "Connected to voice channel");
        Ok(())
    }

    /// Stop streaming if needed, then leave the voice session. No-op when idle.
    ///
    /// The relay is idle afterwards even if leaving fails; the failure is
    /// still reported.
    pub async fn disconnect(&self) -> Result<(), RelayError> {
        let mut guard = self.session.lock().await;
        let Some(mut session) = guard.take() else {
            return Ok(());
        };

        if let Some(pacing) = session.pacing.take() {
            pacing.stop().await;
        }
        let left = session.connection.leave().await;
        self.publish(&guard);

        info!(
            guild_id = %session.guild_id,
            channel_id = %session.channel_id,
            "Disconnected from voice channel"
        );
        left.map_err(|err| RelayError::LeaveFailed(format!("{:#}", err)))
    }

    /// Begin relaying frames from `queue` to the voice session.
    pub async fn start_streaming(&self, queue: Arc<AudioQueue>) -> Result<(), RelayError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(RelayError::NotConnected)?;
        if session.pacing.is_some() {
            return Err(RelayError::AlreadyStreaming);
        }

        codec::probe(self.encoders.as_ref())?;
        let encoder = codec::prepare_encoder(self.encoders.as_ref(), self.settings.bitrate)?;

        session.pacing = Some(PacingHandle::spawn(
            queue,
            session.connection.clone(),
            encoder,
            self.stats.clone(),
            self.settings.initial_delay,
        ));
        self.publish(&guard);

        info!(
            codec = self.encoders.name(),
            bitrate = self.settings.bitrate,
            "Started audio streaming"
        );
        Ok(())
    }

    /// Stop relaying and wait for the pacing tasks to finish. No-op when not
    /// streaming.
    pub async fn stop_streaming(&self) {
        let mut guard = self.session.lock().await;
        let Some(pacing) = guard.as_mut().and_then(|s| s.pacing.take()) else {
            return;
        };

        pacing.stop().await;
        self.publish(&guard);
        info!("Stopped audio streaming");
    }

    /// Release everything before the process exits.
    pub async fn shutdown(&self) {
        if let Err(err) = self.disconnect().await {
            warn!("Voice session teardown during shutdown failed: {}", err);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn is_streaming(&self) -> bool {
        self.status.borrow().streaming
    }

    pub fn status(&self) -> RelayStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RelayStatus> {
        self.status.subscribe()
    }

    /// Connection flag only, for components that do not care about the rest.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn encoder_name(&self) -> &'static str {
        self.encoders.name()
    }

    /// Must be called with the session lock held.
    fn publish(&self, session: &Option<Session>) {
        let status = match session {
            Some(s) => RelayStatus {
                connected: true,
                streaming: s.pacing.is_some(),
                guild_id: Some(s.guild_id.clone()),
                channel_id: Some(s.channel_id.clone()),
            },
            None => RelayStatus::default(),
        };

        self.connected.send_replace(status.connected);
        self.status.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioChunk, FRAME_BYTES};
    use crate::codec::test_support::MarkerEncoderFactory;
    use crate::codec::DisabledEncoderFactory;
    use crate::voice::{LoopbackGateway, LoopbackSettings};

    fn relay_with(gateway: Arc<LoopbackGateway>) -> VoiceRelay {
        VoiceRelay::new(
            gateway,
            Arc::new(MarkerEncoderFactory::new()),
            RelaySettings::default(),
        )
    }

    #[tokio::test]
    async fn test_start_requires_connection() {
        let relay = relay_with(Arc::new(LoopbackGateway::default()));
        let result = relay.start_streaming(Arc::new(AudioQueue::new(4))).await;
        assert!(matches!(result, Err(RelayError::NotConnected)));
        assert!(!relay.is_streaming());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let relay = relay_with(Arc::new(LoopbackGateway::default()));
        let queue = Arc::new(AudioQueue::new(4));
        relay.connect("token", "g", "c").await.unwrap();

        relay.start_streaming(queue.clone()).await.unwrap();
        let second = relay.start_streaming(queue).await;
        assert!(matches!(second, Err(RelayError::AlreadyStreaming)));
        assert!(relay.is_streaming());

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_streaming_is_idempotent() {
        let relay = relay_with(Arc::new(LoopbackGateway::default()));

        relay.stop_streaming().await;
        assert_eq!(relay.status(), RelayStatus::default());

        relay.connect("token", "g", "c").await.unwrap();
        let before = relay.status();
        relay.stop_streaming().await;
        assert_eq!(relay.status(), before);

        relay.start_streaming(Arc::new(AudioQueue::new(4))).await.unwrap();
        relay.stop_streaming().await;
        relay.stop_streaming().await;
        assert!(relay.is_connected());
        assert!(!relay.is_streaming());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_streaming() {
        let gateway = Arc::new(LoopbackGateway::default());
        let relay = relay_with(gateway.clone());
        let queue = Arc::new(AudioQueue::new(8));

        relay.connect("token", "g", "c").await.unwrap();
        relay.start_streaming(queue.clone()).await.unwrap();
        queue.push(AudioChunk::new(vec![1u8; FRAME_BYTES]));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let record = gateway.last_session().unwrap();
        assert!(record.is_speaking());

        relay.disconnect().await.unwrap();
        assert!(!record.is_speaking());
        assert!(record.has_left());
        assert!(!relay.is_connected());
        assert!(!relay.is_streaming());

        let result = relay.start_streaming(queue).await;
        assert!(matches!(result, Err(RelayError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let gateway = Arc::new(LoopbackGateway::default());
        let relay = relay_with(gateway.clone());

        relay.connect("token", "g", "c1").await.unwrap();
        let second = relay.connect("token", "g", "c2").await;
        assert!(matches!(second, Err(RelayError::AlreadyConnected)));
        assert_eq!(relay.status().channel_id.as_deref(), Some("c1"));
        assert_eq!(gateway.session_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_join_changes_nothing() {
        let gateway = Arc::new(LoopbackGateway::default());
        gateway.set_fail_joins(true);
        let relay = relay_with(gateway);
        let mut connected = relay.subscribe_connected();

        let result = relay.connect("token", "g", "c").await;
        assert!(matches!(result, Err(RelayError::SessionEstablishmentFailed(_))));
        assert_eq!(relay.status(), RelayStatus::default());
        assert!(!connected.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let relay = relay_with(Arc::new(LoopbackGateway::default()));
        relay.disconnect().await.unwrap();
        assert!(!relay.is_connected());
    }

    #[tokio::test]
    async fn test_start_fails_without_encoder_capability() {
        let relay = VoiceRelay::new(
            Arc::new(LoopbackGateway::default()),
            Arc::new(DisabledEncoderFactory),
            RelaySettings::default(),
        );
        relay.connect("token", "g", "c").await.unwrap();

        let result = relay.start_streaming(Arc::new(AudioQueue::new(4))).await;
        assert!(matches!(
            result,
            Err(RelayError::Codec(CodecError::EncodingUnavailable))
        ));
        assert!(!relay.is_streaming());
    }

    #[tokio::test]
    async fn test_status_is_published() {
        let relay = relay_with(Arc::new(LoopbackGateway::new(LoopbackSettings::default())));
        let mut status = relay.subscribe();
        let connected = relay.subscribe_connected();

        relay.connect("token", "guild", "chan").await.unwrap();
        assert!(status.has_changed().unwrap());
        let seen = status.borrow_and_update().clone();
        assert_eq!(seen.guild_id.as_deref(), Some("guild"));
        assert!(seen.connected && !seen.streaming);
        assert!(*connected.borrow());

        relay.start_streaming(Arc::new(AudioQueue::new(4))).await.unwrap();
        assert!(status.borrow_and_update().streaming);

        relay.shutdown().await;
        assert!(!*connected.borrow());
    }
}
