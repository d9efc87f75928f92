//! # Voice Control REST API Handlers
//!
//! Local JSON API used to point the relay at a voice channel and to inspect
//! what it is doing.
//!
//! ## Available Endpoints:
//! - `POST /api/connect` - join a voice channel (`{guildId, channelId, token?}`)
//! - `POST /api/disconnect` - stop streaming and leave the channel
//! - `GET /api/status` - producer, voice session and relay counters
//!
//! All routes sit behind [`LocalOriginGuard`](crate::middleware::LocalOriginGuard).

use crate::error::{AppError, AppResult};
use crate::ingest::hub::IngestStatsSnapshot;
use crate::relay::RelayStatsSnapshot;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Request body for `/api/connect`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub guild_id: String,
    pub channel_id: String,
    /// Opaque session token handed to the credential provider
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStats {
    pub ingest: IngestStatsSnapshot,
    pub relay: RelayStatsSnapshot,
}

/// Body of `/api/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Voice session joined
    pub connected: bool,
    /// At least one producer websocket open
    pub producer_connected: bool,
    /// Producer is sending audio
    pub producer_streaming: bool,
    /// Producer streaming and voice connected, i.e. audio reaches the channel
    pub streaming: bool,
    /// Pacing tasks running
    pub relaying: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_guild: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_channel: Option<String>,
    pub client_version: &'static str,
    pub codec: &'static str,
    pub stats: StatusStats,
}

pub async fn connect(
    state: web::Data<AppState>,
    body: web::Json<ConnectRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let guild_id = request.guild_id.trim();
    let channel_id = request.channel_id.trim();

    if guild_id.is_empty() || channel_id.is_empty() {
        return Err(AppError::ValidationError(
            "guildId and channelId are required".to_string(),
        ));
    }

    let credential = state
        .credentials
        .credential(request.token.as_deref())
        .map_err(|err| AppError::BadRequest(err.to_string()))?;

    state.relay.connect(&credential, guild_id, channel_id).await?;
    info!(guild_id, channel_id, "Voice channel connected via control API");

    Ok(HttpResponse::Ok().json(ActionResponse {
        success: true,
        message: "Connected to voice channel".to_string(),
    }))
}

pub async fn disconnect(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    state.relay.disconnect().await?;

    Ok(HttpResponse::Ok().json(ActionResponse {
        success: true,
        message: "Disconnected from voice channel".to_string(),
    }))
}

pub async fn status(state: web::Data<AppState>) -> HttpResponse {
    let relay = state.relay.status();

    HttpResponse::Ok().json(StatusResponse {
        connected: relay.connected,
        producer_connected: state.hub.has_clients(),
        producer_streaming: state.hub.is_streaming(),
        streaming: state.is_relaying_audio(),
        relaying: relay.streaming,
        current_guild: relay.guild_id,
        current_channel: relay.channel_id,
        client_version: env!("CARGO_PKG_VERSION"),
        codec: state.relay.encoder_name(),
        stats: StatusStats {
            ingest: state.hub.stats(),
            relay: state.relay.stats(),
        },
    })
}

/// Register the control routes on an Actix app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/connect", web::post().to(connect))
            .route("/disconnect", web::post().to(disconnect))
            .route("/status", web::get().to(status)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_support::MarkerEncoderFactory;
    use crate::config::AppConfig;
    use crate::credential::StaticCredentialProvider;
    use crate::ingest::{IngestHub, ProducerMessage};
    use crate::middleware::LocalOriginGuard;
    use crate::relay::VoiceRelay;
    use crate::voice::LoopbackGateway;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn app_state(token: Option<&str>, gateway: Arc<LoopbackGateway>) -> AppState {
        let config = AppConfig::default();
        let relay = Arc::new(VoiceRelay::new(
            gateway,
            Arc::new(MarkerEncoderFactory::new()),
            config.relay_settings(),
        ));
        let hub = Arc::new(IngestHub::new(config.hub_settings(), relay.subscribe_connected()));
        let credentials = Arc::new(StaticCredentialProvider::new(token.map(str::to_string)));
        AppState::new(config, hub, relay, credentials)
    }

    #[actix_web::test]
    async fn test_connect_status_disconnect() {
        let state = app_state(Some("bot"), Arc::new(LoopbackGateway::default()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/connect")
            .set_json(json!({"guildId": "g1", "channelId": "c1"}))
            .to_request();
        let resp: ActionResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.success);

        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["connected"], true);
        assert_eq!(body["producerConnected"], false);
        assert_eq!(body["streaming"], false);
        assert_eq!(body["currentGuild"], "g1");
        assert_eq!(body["currentChannel"], "c1");
        assert_eq!(body["stats"]["relay"]["framesSent"], 0);

        let req = test::TestRequest::post().uri("/api/disconnect").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(!state.relay.is_connected());
    }

    #[actix_web::test]
    async fn test_status_streaming_needs_producer_and_voice() {
        let state = app_state(Some("bot"), Arc::new(LoopbackGateway::default()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        state
            .hub
            .dispatch(uuid::Uuid::new_v4(), ProducerMessage::StreamStart);
        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["producerStreaming"], true);
        assert_eq!(body["streaming"], false);

        state.relay.connect("bot", "g1", "c1").await.unwrap();
        let req = test::TestRequest::get().uri("/api/status").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["streaming"], true);
        assert_eq!(body["stats"]["ingest"]["chunksReceived"], 0);
        assert_eq!(body["stats"]["relay"]["chunksBuffered"], 0);
        assert!(body["stats"]["relay"].get("chunksReceived").is_none());

        state.relay.shutdown().await;
    }

    #[actix_web::test]
    async fn test_connect_errors() {
        let gateway = Arc::new(LoopbackGateway::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(None, gateway.clone())))
                .configure(configure),
        )
        .await;

        // No configured credential and none in the request
        let req = test::TestRequest::post()
            .uri("/api/connect")
            .set_json(json!({"guildId": "g", "channelId": "c"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/connect")
            .set_json(json!({"guildId": "", "channelId": "c", "token": "t"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        gateway.set_fail_joins(true);
        let req = test::TestRequest::post()
            .uri("/api/connect")
            .set_json(json!({"guildId": "g", "channelId": "c", "token": "t"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_GATEWAY);

        gateway.set_fail_joins(false);
        for expected in [StatusCode::OK, StatusCode::CONFLICT] {
            let req = test::TestRequest::post()
                .uri("/api/connect")
                .set_json(json!({"guildId": "g", "channelId": "c", "token": "t"}))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), expected);
        }
    }

    #[actix_web::test]
    async fn test_foreign_origin_is_forbidden() {
        let port = AppConfig::default().server.port;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_state(
                    Some("bot"),
                    Arc::new(LoopbackGateway::default()),
                )))
                .wrap(LocalOriginGuard::new(port))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/disconnect")
            .insert_header(("Origin", "https://evil.example"))
            .to_request();
        let resp = test::try_call_service(&app, req).await;
        let status = match resp {
            Ok(resp) => resp.status(),
            Err(err) => err.as_response_error().status_code(),
        };
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/status")
            .insert_header(("Origin", format!("http://localhost:{}", port)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
