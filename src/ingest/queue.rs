//! # Drop-Oldest Audio Queue
//!
//! Bounded hand-off between the websocket connections (producers) and the relay
//! (single consumer).
//!
//! ## Overflow Policy:
//! When full, `push` evicts the element at the head to admit the new one. Under
//! sustained overload the consumer therefore always sees the most recent audio,
//! which keeps end-to-end latency bounded. Retained chunks stay in FIFO order.
//!
//! ## Thread Safety:
//! `parking_lot::Mutex<VecDeque<_>>` holds the items; a `tokio::sync::Notify`
//! wakes the consumer. `push` never awaits, so it can be called from actor
//! message handlers.

use crate::audio::AudioChunk;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

pub struct AudioQueue {
    items: Mutex<VecDeque<AudioChunk>>,
    capacity: usize,
    available: Notify,
    /// Chunks evicted by the overflow policy since creation
    evicted: AtomicU64,
}

impl AudioQueue {
    /// Create a queue holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            evicted: AtomicU64::new(0),
        }
    }

    /// Enqueue a chunk, evicting the oldest one if the queue is full.
    ///
    /// Returns the evicted chunk, if any.
    pub fn push(&self, chunk: AudioChunk) -> Option<AudioChunk> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(chunk);
            evicted
        };

        if evicted.is_some() {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }

        // Stores a permit if the consumer is not waiting yet
        self.available.notify_one();
        evicted
    }

    /// Take the oldest chunk without waiting.
    pub fn try_pop(&self) -> Option<AudioChunk> {
        self.items.lock().pop_front()
    }

    /// Wait for and take the oldest chunk.
    ///
    /// Intended for a single consumer. Cancel-safe: dropping the future never
    /// loses a chunk.
    pub async fn pop(&self) -> AudioChunk {
        loop {
            if let Some(chunk) = self.try_pop() {
                return chunk;
            }
            self.available.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total chunks dropped to make room for newer ones.
    pub fn evicted_count(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<AudioChunk> {
        self.items.lock().iter().cloned().collect()
    }
}
