//! # Configuration Management
//!
//! This module handles loading and managing the relay's configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with RELAY__ prefix, `__` between levels)
//! - A handful of well-known variables (HOST, PORT, WEBSOCKET_PORT, DISCORD_BOT_TOKEN)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Converts between these structs and the layered config sources
//! - **#[serde(default)]**: Missing sections fall back to their `Default` impl
//! - **Result<T, E>**: Loading and validation report failures instead of panicking
//!
//! ## Configuration Priority (highest to lowest):
//! 1. HOST, PORT, WEBSOCKET_PORT, DISCORD_BOT_TOKEN
//! 2. Environment variables (RELAY__SERVER__PORT, RELAY__INGEST__QUEUE_CAPACITY, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impls)
//!
//! The audio format (48kHz mono, 960 samples per 20ms frame) is fixed and not
//! configurable; see [`crate::audio`].

use crate::ingest::{HeartbeatSettings, HubSettings};
use crate::relay::RelaySettings;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Sections:
/// - `server`: the local JSON control API
/// - `ingest`: the producer websocket endpoint and its queue
/// - `audio`: encoder and pacing parameters
/// - `voice`: voice sink credential and channel sizing
/// - `orchestrator`: supervisory poll loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub audio: AudioConfig,
    pub voice: VoiceConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Control API listen address.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: local tools only (the control API is not meant to be public)
/// - `port = 48766`: default control port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 48766,
        }
    }
}

/// Producer websocket endpoint settings.
///
/// ## Fields:
/// - `queue_capacity`: chunks held between the websocket and the relay; the
///   oldest is dropped when full
/// - `idle_timeout_secs`: silence after which the producer counts as not streaming
/// - `expected_producer_version`: compared against the producer's handshake
/// - `heartbeat_interval_secs` / `client_timeout_secs`: ping period and dead-peer cutoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub host: String,
    pub port: u16,
    pub queue_capacity: usize,
    pub idle_timeout_secs: u64,
    pub expected_producer_version: String,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            queue_capacity: 100,
            idle_timeout_secs: 10,
            expected_producer_version: "1.3.5".to_string(),
            heartbeat_interval_secs: 30,
            client_timeout_secs: 60,
        }
    }
}

/// Encoder and pacing settings.
///
/// ## Fields:
/// - `bitrate`: encoder target in bits per second (libopus accepts 6000..=510000)
/// - `initial_delay_ms`: wait before the first 20ms pacing tick
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub bitrate: i32,
    pub initial_delay_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bitrate: crate::codec::DEFAULT_BITRATE,
            initial_delay_ms: 20,
        }
    }
}

/// Voice sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Static credential used when a connect request carries none
    pub bot_token: Option<String>,
    /// Outbound packet channel capacity of the voice sink
    pub sink_capacity: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            sink_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub poll_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with RELAY__
    /// 4. Apply the well-known variables last
    ///
    /// ## Environment Variable Examples:
    /// - `RELAY__INGEST__QUEUE_CAPACITY=50`: smaller ingestion queue
    /// - `RELAY__AUDIO__BITRATE=96000`: lower encoder bitrate
    /// - `WEBSOCKET_PORT=9000`: move the producer endpoint
    /// - `DISCORD_BOT_TOKEN=...`: static voice credential
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("RELAY").separator("__"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(port) = env::var("WEBSOCKET_PORT") {
            settings = settings.set_override("ingest.port", port)?;
        }

        if let Ok(token) = env::var("DISCORD_BOT_TOKEN") {
            settings = settings.set_override("voice.bot_token", token)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Neither port is 0, and the two listeners do not share a port
    /// - Queue capacity, idle timeout and poll interval are non-zero
    /// - Bitrate is within what the encoder accepts
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        if self.ingest.port == 0 {
            return Err(anyhow!("WebSocket port cannot be 0"));
        }

        if self.server.port == self.ingest.port {
            return Err(anyhow!(
                "Control API and WebSocket endpoint cannot share port {}",
                self.server.port
            ));
        }

        if self.ingest.queue_capacity == 0 {
            return Err(anyhow!("Ingest queue capacity must be greater than 0"));
        }

        if self.ingest.idle_timeout_secs == 0 {
            return Err(anyhow!("Idle timeout must be greater than 0"));
        }

        if !(6_000..=510_000).contains(&self.audio.bitrate) {
            return Err(anyhow!(
                "Bitrate {} is outside the supported range 6000..=510000",
                self.audio.bitrate
            ));
        }

        if self.orchestrator.poll_interval_ms == 0 {
            return Err(anyhow!("Orchestrator poll interval must be greater than 0"));
        }

        Ok(())
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            queue_capacity: self.ingest.queue_capacity,
            idle_timeout: Duration::from_secs(self.ingest.idle_timeout_secs),
            expected_producer_version: self.ingest.expected_producer_version.clone(),
        }
    }

    pub fn heartbeat_settings(&self) -> HeartbeatSettings {
        HeartbeatSettings {
            interval: Duration::from_secs(self.ingest.heartbeat_interval_secs.max(1)),
            client_timeout: Duration::from_secs(self.ingest.client_timeout_secs.max(1)),
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            bitrate: self.audio.bitrate,
            initial_delay: Duration::from_millis(self.audio.initial_delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.orchestrator.poll_interval_ms)
    }
}
