//! # Orchestrator
//!
//! Supervisory poll loop tying the ingestion side to the relay. Once per poll
//! interval it checks whether the voice session is connected, the relay idle
//! and the producer streaming, and starts the relay when all three hold.
//!
//! Start failures are logged and left for the next tick; the orchestrator never
//! retries within one tick.

use crate::ingest::IngestHub;
use crate::relay::{RelayError, VoiceRelay};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a single reconcile pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The relay was started on this pass
    Started,
    /// Nothing to do: no voice session
    NotConnected,
    /// Nothing to do: the relay is already running
    AlreadyStreaming,
    /// Nothing to do: no audio is arriving
    ProducerIdle,
    /// Starting was attempted and failed
    Failed(String),
}

pub struct Orchestrator {
    hub: Arc<IngestHub>,
    relay: Arc<VoiceRelay>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(hub: Arc<IngestHub>, relay: Arc<VoiceRelay>, poll_interval: Duration) -> Self {
        Self {
            hub,
            relay,
            poll_interval,
        }
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Orchestrator started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.reconcile().await;
        }

        info!("Orchestrator stopped");
    }

    /// One supervisory pass.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        if !self.relay.is_connected() {
            return ReconcileOutcome::NotConnected;
        }
        if self.relay.is_streaming() {
            return ReconcileOutcome::AlreadyStreaming;
        }
        if !self.hub.is_streaming() {
            return ReconcileOutcome::ProducerIdle;
        }

        match self.relay.start_streaming(self.hub.queue()).await {
            Ok(()) => {
                info!("Producer audio detected, relay started");
                ReconcileOutcome::Started
            }
            // Lost a race with another caller; the next pass sees the new state
            Err(err @ (RelayError::AlreadyStreaming | RelayError::NotConnected)) => {
                debug!("Relay start skipped: {}", err);
                ReconcileOutcome::Failed(err.to_string())
            }
            Err(err) => {
                warn!("Failed to start relay: {}", err);
                ReconcileOutcome::Failed(err.to_string())
            }
        }
    }
}
