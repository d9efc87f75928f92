//! # Loopback Voice Sink
//!
//! A [`VoiceGateway`] that keeps everything in-process: packets pushed into the
//! outbound channel are consumed by a background task and counted. Useful for
//! running the relay without a network transport and for asserting on what the
//! relay sent.

use crate::audio::EncodedPacket;
use crate::voice::{VoiceConnection, VoiceGateway};
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Behaviour knobs for the loopback sink.
#[derive(Debug, Clone)]
pub struct LoopbackSettings {
    /// Capacity of the outbound packet channel
    pub channel_capacity: usize,
    /// Delay between join and readiness
    pub ready_delay: Duration,
    /// Delay the consumer applies per packet (simulates a slow transport)
    pub consume_delay: Duration,
    /// Keep received packets for inspection
    pub record_packets: bool,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            ready_delay: Duration::ZERO,
            consume_delay: Duration::ZERO,
            record_packets: false,
        }
    }
}

/// What the sink observed for one session.
#[derive(Debug, Default)]
pub struct LoopbackRecord {
    pub guild_id: String,
    pub channel_id: String,
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub speaking: AtomicBool,
    pub speaking_changes: AtomicU64,
    pub left: AtomicBool,
    pub received: Mutex<Vec<EncodedPacket>>,
}

impl LoopbackRecord {
    pub fn packet_count(&self) -> u64 {
        self.packets.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub fn has_left(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<EncodedPacket> {
        self.received.lock().clone()
    }
}

pub struct LoopbackGateway {
    settings: LoopbackSettings,
    fail_joins: AtomicBool,
    /// Only the latest session is kept; earlier records are released on rejoin
    current: Mutex<Option<Arc<LoopbackRecord>>>,
    joins: AtomicUsize,
}

impl LoopbackGateway {
    pub fn new(settings: LoopbackSettings) -> Self {
        Self {
            settings,
            fail_joins: AtomicBool::new(false),
            current: Mutex::new(None),
            joins: AtomicUsize::new(0),
        }
    }

    /// Make subsequent joins fail (to exercise session-establishment errors).
    pub fn set_fail_joins(&self, fail: bool) {
        self.fail_joins.store(fail, Ordering::SeqCst);
    }

    /// Record of the most recently joined session.
    pub fn last_session(&self) -> Option<Arc<LoopbackRecord>> {
        self.current.lock().clone()
    }

    /// Number of successful joins so far.
    pub fn session_count(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

impl Default for LoopbackGateway {
    fn default() -> Self {
        Self::new(LoopbackSettings::default())
    }
}

#[async_trait]
impl VoiceGateway for LoopbackGateway {
    async fn join(
        &self,
        credential: &str,
        guild_id: &str,
        channel_id: &str,
    ) -> anyhow::Result<Arc<dyn VoiceConnection>> {
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(anyhow!("voice join rejected for channel {}", channel_id));
        }
        if credential.is_empty() {
            return Err(anyhow!("empty voice credential"));
        }

        let record = Arc::new(LoopbackRecord {
            guild_id: guild_id.to_string(),
            channel_id: channel_id.to_string(),
            ..Default::default()
        });
        *self.current.lock() = Some(record.clone());
        self.joins.fetch_add(1, Ordering::SeqCst);

        let (ready_tx, ready_rx) = watch::channel(self.settings.ready_delay.is_zero());
        if !self.settings.ready_delay.is_zero() {
            let delay = self.settings.ready_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = ready_tx.send(true);
            });
        }

        let (sender, receiver) = mpsc::channel(self.settings.channel_capacity.max(1));
        tokio::spawn(consume_packets(
            receiver,
            record.clone(),
            self.settings.consume_delay,
            self.settings.record_packets,
        ));

        info!(guild_id, channel_id, "Loopback voice session joined");
        Ok(Arc::new(LoopbackConnection {
            record,
            ready: ready_rx,
            sender,
        }))
    }
}

async fn consume_packets(
    mut receiver: mpsc::Receiver<EncodedPacket>,
    record: Arc<LoopbackRecord>,
    consume_delay: Duration,
    keep: bool,
) {
    while let Some(packet) = receiver.recv().await {
        record.packets.fetch_add(1, Ordering::SeqCst);
        record.bytes.fetch_add(packet.len() as u64, Ordering::SeqCst);
        if keep {
            record.received.lock().push(packet);
        }
        if !consume_delay.is_zero() {
            tokio::time::sleep(consume_delay).await;
        }
    }
    debug!(channel_id = %record.channel_id, "Loopback packet consumer finished");
}

struct LoopbackConnection {
    record: Arc<LoopbackRecord>,
    ready: watch::Receiver<bool>,
    sender: mpsc::Sender<EncodedPacket>,
}

#[async_trait]
impl VoiceConnection for LoopbackConnection {
    async fn ready(&self) {
        let mut ready = self.ready.clone();
        // Sender dropping after `true` is fine; an error here means it was
        // dropped before readiness, which cannot happen once spawned
        let _ = ready.wait_for(|ready| *ready).await;
    }

    fn set_speaking(&self, speaking: bool) {
        let previous = self.record.speaking.swap(speaking, Ordering::SeqCst);
        if previous != speaking {
            self.record.speaking_changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn packet_sender(&self) -> mpsc::Sender<EncodedPacket> {
        self.sender.clone()
    }

    async fn leave(&self) -> anyhow::Result<()> {
        self.record.left.store(true, Ordering::SeqCst);
        info!(channel_id = %self.record.channel_id, "Loopback voice session left");
        Ok(())
    }
}
