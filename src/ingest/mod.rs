//! # Ingestion Endpoint
//!
//! Receives the producer's PCM stream and turns it into queued [`AudioChunk`]s
//! plus a live "is the producer streaming" signal.
//!
//! ## Key Components:
//! - **protocol**: typed producer/server messages
//! - **queue**: bounded drop-oldest hand-off to the relay
//! - **liveness**: streaming flag with idle timeout
//! - **hub**: connection set and message interpretation
//! - **websocket**: one Actix actor per producer connection
//!
//! [`AudioChunk`]: crate::audio::AudioChunk

pub mod hub;
pub mod liveness;
pub mod protocol;
pub mod queue;
pub mod websocket;

pub use hub::{HubSettings, IngestHub};
pub use liveness::StreamingState;
pub use protocol::{ProducerMessage, ServerMessage};
pub use queue::AudioQueue;
pub use websocket::{HeartbeatSettings, IngestEndpoint};
