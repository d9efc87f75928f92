//! # Voice Relay Backend
//!
//! Relays a live PCM stream from a browser extension to a voice-chat channel.
//!
//! ## Data Flow:
//! producer websocket -> [`ingest`] (drop-oldest queue) -> [`relay`] (frame
//! buffer, 20ms pacing) -> [`codec`] -> [`voice`] sink
//!
//! ## Application Architecture:
//! - **audio**: chunk, frame and packet types plus the frame buffer
//! - **codec**: capability-gated encoder interface (opus or disabled)
//! - **ingest**: producer websocket endpoint, liveness state, queue
//! - **relay**: voice session lifecycle and the pacing tasks
//! - **voice**: voice sink traits and the in-process loopback sink
//! - **orchestrator**: starts the relay when audio shows up
//! - **config / error / state / health / middleware / handlers**: the local
//!   control API around all of the above

pub mod audio;
pub mod codec;
pub mod config;
pub mod credential;
pub mod error;
pub mod handlers;
pub mod health;
pub mod ingest;
pub mod middleware;
pub mod orchestrator;
pub mod relay;
pub mod state;
pub mod voice;
