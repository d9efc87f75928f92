//! # Ingestion Hub
//!
//! Shared state of the ingestion endpoint and the interpretation of producer
//! messages. The websocket actor only moves frames in and out; every decision
//! about what a message means is made here, which keeps it testable without a
//! socket.
//!
//! ## Owned State:
//! - **clients**: active producer connections (mutated only on connect/close)
//! - **liveness**: the streaming flag and its idle timer
//! - **queue**: the bounded drop-oldest hand-off to the relay
//! - **voice_connected**: read-only view of the relay's connection flag, used
//!   to answer `status` requests

use crate::audio::AudioChunk;
use crate::ingest::liveness::StreamingState;
use crate::ingest::protocol::{decode_audio_payload, ProducerMessage, ServerMessage};
use crate::ingest::queue::AudioQueue;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifier assigned to each producer connection.
pub type ClientId = Uuid;

/// Settings the hub needs from the application configuration.
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub queue_capacity: usize,
    pub idle_timeout: Duration,
    pub expected_producer_version: String,
}

/// Counters for the ingestion side.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub chunks_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub decode_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`] plus queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatsSnapshot {
    pub chunks_received: u64,
    pub bytes_received: u64,
    pub decode_failures: u64,
    pub chunks_evicted: u64,
    pub queued_chunks: usize,
}

pub struct IngestHub {
    clients: RwLock<HashSet<ClientId>>,
    liveness: StreamingState,
    queue: Arc<AudioQueue>,
    voice_connected: watch::Receiver<bool>,
    expected_version: String,
    stats: IngestStats,
}

impl IngestHub {
    /// Create a hub. `voice_connected` is the relay's published connection
    /// flag (see [`crate::relay::VoiceRelay::subscribe_connected`]).
    pub fn new(settings: HubSettings, voice_connected: watch::Receiver<bool>) -> Self {
        Self {
            clients: RwLock::new(HashSet::new()),
            liveness: StreamingState::new(settings.idle_timeout),
            queue: Arc::new(AudioQueue::new(settings.queue_capacity)),
            voice_connected,
            expected_version: settings.expected_producer_version,
            stats: IngestStats::default(),
        }
    }

    /// Register a new producer connection.
    pub fn register_client(&self) -> ClientId {
        let id = Uuid::new_v4();
        let count = {
            let mut clients = self.clients.write();
            clients.insert(id);
            clients.len()
        };
        info!(client_id = %id, active_clients = count, "Producer connected");
        id
    }

    /// Remove a producer connection. When the last one leaves, streaming is
    /// forced off immediately instead of waiting for the idle timer.
    pub fn unregister_client(&self, id: ClientId) {
        // Hold the client lock across the flag update so a connection arriving
        // concurrently cannot be counted as "none left"
        let mut clients = self.clients.write();
        if !clients.remove(&id) {
            return;
        }
        info!(client_id = %id, active_clients = clients.len(), "Producer disconnected");
        if clients.is_empty() {
            self.liveness.force_idle();
        }
    }

    /// Whether any producer is connected.
    pub fn has_clients(&self) -> bool {
        !self.clients.read().is_empty()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Whether the producer is currently considered live.
    pub fn is_streaming(&self) -> bool {
        self.liveness.is_streaming()
    }

    /// The queue the relay drains.
    pub fn queue(&self) -> Arc<AudioQueue> {
        self.queue.clone()
    }

    pub fn liveness(&self) -> &StreamingState {
        &self.liveness
    }

    /// Interpret one producer message. Returns the reply to send back, if any.
    ///
    /// Never fails: malformed audio is logged and dropped.
    pub fn dispatch(&self, client: ClientId, message: ProducerMessage) -> Option<ServerMessage> {
        match message {
            ProducerMessage::Handshake { version } => self.handle_handshake(client, version),
            ProducerMessage::Audio { audio } => {
                if audio.is_empty() {
                    return None;
                }
                match decode_audio_payload(&audio) {
                    Ok(bytes) => self.ingest_chunk(AudioChunk::new(bytes)),
                    Err(err) => {
                        self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                        debug!(client_id = %client, "Dropping undecodable audio chunk: {}", err);
                    }
                }
                None
            }
            ProducerMessage::Status => Some(self.status()),
            ProducerMessage::StreamStart => {
                info!(client_id = %client, "Received stream start notification from producer");
                self.liveness.set_streaming(true);
                None
            }
            ProducerMessage::StreamStop => {
                info!(client_id = %client, "Received stream stop notification from producer");
                self.liveness.set_streaming(false);
                None
            }
            ProducerMessage::StreamPause => {
                info!(client_id = %client, "Producer paused playback - streaming paused");
                self.liveness.set_streaming(false);
                None
            }
            ProducerMessage::StreamResume => {
                info!(client_id = %client, "Producer resumed playback - streaming resumed");
                self.liveness.set_streaming(true);
                None
            }
        }
    }

    /// Accept one decoded chunk: mark the producer live, re-arm the idle timer,
    /// and enqueue with drop-oldest.
    pub fn ingest_chunk(&self, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }

        self.stats.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_received
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);

        self.liveness.mark_audio();

        if let Some(evicted) = self.queue.push(chunk) {
            debug!(evicted_bytes = evicted.len(), "Audio queue full, dropped oldest chunk");
        }
    }

    /// Current `status` reply.
    pub fn status(&self) -> ServerMessage {
        ServerMessage::Status {
            connected: *self.voice_connected.borrow(),
            streaming: self.is_streaming(),
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            chunks_received: self.stats.chunks_received.load(Ordering::Relaxed),
            bytes_received: self.stats.bytes_received.load(Ordering::Relaxed),
            decode_failures: self.stats.decode_failures.load(Ordering::Relaxed),
            chunks_evicted: self.queue.evicted_count(),
            queued_chunks: self.queue.len(),
        }
    }

    fn handle_handshake(&self, client: ClientId, version: Option<String>) -> Option<ServerMessage> {
        let version = version.filter(|v| !v.is_empty())?;

        if version == self.expected_version {
            info!(client_id = %client, version = %version, "Producer version confirmed");
            return None;
        }

        let message = format!(
            "Producer version mismatch: expected v{}, got v{}. Please update the extension.",
            self.expected_version, version
        );
        warn!(client_id = %client, "{}", message);

        Some(ServerMessage::VersionMismatch {
            message,
            expected_version: self.expected_version.clone(),
            actual_version: version,
        })
    }
}
