//! # Producer Liveness
//!
//! Owns the "is the producer streaming" flag together with its idle timer.
//!
//! ## Single Point of Mutation:
//! The flag, the timer generation, and the timer handle live behind one
//! `RwLock`. Audio arrival, explicit overrides from the producer, connection
//! loss, and the timer firing all go through this struct, so none of them can
//! overwrite another's update with a stale value.
//!
//! ## Timer Rules:
//! - Every audio chunk, and every explicit start/resume, sets the flag and
//!   re-arms the timer (the old one is aborted)
//! - An explicit stop/pause cancels the timer
//! - At most one timer is outstanding at any time
//! - A timer only clears the flag if no newer arm/cancel happened since it was
//!   armed (checked by generation number)

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Default time without audio before the producer is considered idle.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct LivenessInner {
    streaming: bool,
    /// Bumped every time the timer is armed or cancelled
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl LivenessInner {
    /// Returns true when the value actually changed.
    fn set(&mut self, streaming: bool) -> bool {
        if self.streaming == streaming {
            return false;
        }
        self.streaming = streaming;
        if streaming {
            info!("Producer started streaming audio");
        } else {
            info!("Producer stopped streaming audio");
        }
        true
    }

    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Shared streaming flag with idle detection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StreamingState {
    inner: Arc<RwLock<LivenessInner>>,
    idle_timeout: Duration,
}

impl StreamingState {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LivenessInner {
                streaming: false,
                generation: 0,
                timer: None,
            })),
            idle_timeout,
        }
    }

    /// Current value of the flag. Takes the read side of the lock only.
    pub fn is_streaming(&self) -> bool {
        self.inner.read().streaming
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Record that an audio chunk arrived: streaming becomes true and the idle
    /// timer restarts from zero.
    ///
    /// Must be called from within a tokio runtime (the timer is a spawned task).
    pub fn mark_audio(&self) {
        let mut inner = self.inner.write();
        inner.set(true);
        self.arm_timer(&mut inner);
    }

    /// Explicit override from the producer (`streamStart`, `streamPause`, ...).
    ///
    /// `true` arms a fresh idle timer, so a producer that goes silent after
    /// `streamResume` still times out. `false` cancels any outstanding timer.
    pub fn set_streaming(&self, streaming: bool) {
        let mut inner = self.inner.write();
        inner.set(streaming);
        if streaming {
            self.arm_timer(&mut inner);
        } else {
            inner.cancel_timer();
        }
    }

    /// Immediate stop, e.g. when the last producer connection closes.
    pub fn force_idle(&self) {
        self.set_streaming(false);
    }

    /// Whether an idle timer is currently armed and has not fired yet.
    pub fn timer_pending(&self) -> bool {
        self.inner
            .read()
            .timer
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// Replaces any outstanding timer with one tagged by the new generation.
    fn arm_timer(&self, inner: &mut LivenessInner) {
        inner.cancel_timer();

        let generation = inner.generation;
        let weak: Weak<RwLock<LivenessInner>> = Arc::downgrade(&self.inner);
        let timeout = self.idle_timeout;

        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                Self::expire(&inner, generation, timeout);
            }
        }));
    }

    fn expire(inner: &RwLock<LivenessInner>, generation: u64, timeout: Duration) {
        let mut inner = inner.write();
        if inner.generation != generation {
            // Re-armed or cancelled after this timer started sleeping
            return;
        }
        inner.timer = None;
        if inner.set(false) {
            info!(
                idle_secs = timeout.as_secs(),
                "Audio streaming timeout - no data received"
            );
        }
    }
}

impl Drop for LivenessInner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
