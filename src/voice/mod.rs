//! # Voice Sink Interface
//!
//! Contract with the external voice-chat transport. The relay only needs to:
//! join a destination, wait until the session is ready, toggle the "speaking"
//! indicator, push encoded packets into a bounded outbound channel, and leave.
//!
//! Connection establishment and the wire protocol live behind these traits.
//! [`loopback::LoopbackGateway`] is the in-process implementation used when no
//! network transport is wired in, and by the tests.

pub mod loopback;

pub use loopback::{LoopbackGateway, LoopbackSettings};

use crate::audio::EncodedPacket;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Establishes voice sessions.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Join `channel_id` in `guild_id` using `credential`.
    async fn join(
        &self,
        credential: &str,
        guild_id: &str,
        channel_id: &str,
    ) -> anyhow::Result<Arc<dyn VoiceConnection>>;
}

/// One joined voice session.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Resolves once the session can accept packets.
    async fn ready(&self);

    /// Toggle the "speaking" indicator shown to other participants.
    fn set_speaking(&self, speaking: bool);

    /// Bounded outbound channel for encoded packets.
    fn packet_sender(&self) -> mpsc::Sender<EncodedPacket>;

    /// Leave the destination and release the session.
    async fn leave(&self) -> anyhow::Result<()>;
}
