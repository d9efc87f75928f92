use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;
    let relay = state.relay.status();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": "voice-relay-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "ingest": {
            "port": config.ingest.port,
            "producers": state.hub.client_count(),
            "streaming": state.hub.is_streaming()
        },
        "relay": {
            "codec": state.relay.encoder_name(),
            "connected": relay.connected,
            "streaming": relay.streaming
        }
    }))
}
