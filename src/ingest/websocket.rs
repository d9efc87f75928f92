//! # Producer WebSocket Handler
//!
//! Accepts persistent websocket connections from the audio producer (the
//! browser extension) and feeds its messages to the [`IngestHub`].
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: producer connects to `/`, server greets with `{"type":"handshake"}`
//! 2. **Handshake**: producer may announce its version; mismatches get a warning back
//! 3. **Audio Streaming**: `audio` text messages carry base64 PCM; binary frames
//!    are accepted as raw PCM
//! 4. **Control**: `status`, `streamStart`, `streamStop`, `streamPause`, `streamResume`
//! 5. **Close**: the connection is removed from the active set; the last one
//!    leaving stops streaming immediately
//!
//! ## Actor Model:
//! Each connection is an independent Actix actor, so a slow or stuck producer
//! never delays another.

use crate::audio::AudioChunk;
use crate::ingest::hub::{ClientId, IngestHub};
use crate::ingest::protocol::{ProducerMessage, ServerMessage};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Heartbeat timing for producer connections.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    /// How often the server pings the producer
    pub interval: Duration,
    /// How long a producer may stay silent (no frames, no pongs) before it is dropped
    pub client_timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared data for the ingestion route.
#[derive(Clone)]
pub struct IngestEndpoint {
    pub hub: Arc<IngestHub>,
    pub heartbeat: HeartbeatSettings,
}

/// WebSocket actor for one producer connection.
pub struct ProducerSocket {
    hub: Arc<IngestHub>,
    heartbeat: HeartbeatSettings,
    /// Assigned in `started`, released in `stopped`
    client_id: Option<ClientId>,
    last_heartbeat: Instant,
}

impl ProducerSocket {
    pub fn new(endpoint: &IngestEndpoint) -> Self {
        Self {
            hub: endpoint.hub.clone(),
            heartbeat: endpoint.heartbeat,
            client_id: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match message.to_json() {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize server message: {}", err),
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(client) = self.client_id else {
            return;
        };

        match ProducerMessage::parse(text) {
            Ok(message) => {
                if !matches!(message, ProducerMessage::Audio { .. }) {
                    debug!(client_id = %client, kind = message.kind(), "Producer message");
                }
                if let Some(reply) = self.hub.dispatch(client, message) {
                    self.send(ctx, &reply);
                }
            }
            Err(err) => {
                // Malformed or unknown messages never close the connection
                warn!(client_id = %client, "Ignoring unreadable producer message: {}", err);
            }
        }
    }
}

impl Actor for ProducerSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.client_id = Some(self.hub.register_client());
        self.send(ctx, &ServerMessage::Handshake);

        let client_timeout = self.heartbeat.client_timeout;
        ctx.run_interval(self.heartbeat.interval, move |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > client_timeout {
                warn!("Producer heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Called when the WebSocket connection stops, whatever the reason.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(id) = self.client_id.take() {
            self.hub.unregister_client(id);
        }
    }
}

/// Handle incoming WebSocket frames.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ProducerSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_heartbeat = Instant::now();

        match msg {
            Ok(ws::Message::Text(text)) => {
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                // Already-binary PCM, same path as a decoded `audio` message
                self.hub.ingest_chunk(AudioChunk::new(data.to_vec()));
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!("Producer closed connection: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("Producer WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Upgrades the request and hands the connection to a new [`ProducerSocket`] actor.
/// Any origin is accepted: the producer is a browser extension whose origin is
/// not a web page.
pub async fn producer_websocket(
    req: HttpRequest,
    stream: web::Payload,
    endpoint: web::Data<IngestEndpoint>,
) -> ActixResult<HttpResponse> {
    info!(
        "New producer connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    ws::start(ProducerSocket::new(&endpoint), &req, stream)
}

/// Register the ingestion route on an Actix app.
pub fn configure(endpoint: IngestEndpoint) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(endpoint))
            .route("/", web::get().to(producer_websocket))
            .route("/ws", web::get().to(producer_websocket));
    }
}
