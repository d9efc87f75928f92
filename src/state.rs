//! # Application State Management
//!
//! Shared state handed to every control API handler. The components inside
//! already own their synchronization, so the state itself is just a bundle of
//! `Arc`s that is cheap to clone per worker.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets the ingestion server, the control API, and the
//!   orchestrator share one hub and one relay
//! - **Memory safety**: The components live until the last clone is dropped
//!
//! ### Trait objects (`Arc<dyn CredentialProvider>`)
//! - **Purpose**: Handlers depend on the capability, not on a concrete type,
//!   so tests can swap in their own provider
//!
//! ## Where the locks are:
//! - `IngestHub`: connection set (RwLock) and streaming flag (its own lock)
//! - `VoiceRelay`: lifecycle mutex, status published through `watch`
//! - `AppConfig`: immutable after startup, no lock needed

use crate::config::AppConfig;
use crate::credential::CredentialProvider;
use crate::ingest::IngestHub;
use crate::relay::VoiceRelay;
use std::sync::Arc;
use std::time::Instant;

/// State shared across all control API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at startup
    pub config: Arc<AppConfig>,

    /// Ingestion side: producer connections, streaming flag, audio queue
    pub hub: Arc<IngestHub>,

    /// Voice session lifecycle and pacing
    pub relay: Arc<VoiceRelay>,

    /// Resolves the credential used by `/api/connect`
    pub credentials: Arc<dyn CredentialProvider>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        hub: Arc<IngestHub>,
        relay: Arc<VoiceRelay>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            hub,
            relay,
            credentials,
            start_time: Instant::now(),
        }
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Producer is streaming and the voice session is up: audio actually
    /// reaches the destination.
    pub fn is_relaying_audio(&self) -> bool {
        self.hub.is_streaming() && self.relay.is_connected()
    }
}
