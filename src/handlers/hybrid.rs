use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::config::Settings;
use crate::handlers::long_poll::{long_poll, LongPollQuery};
use crate::handlers::sse::{sse_stream, SseQuery};
use crate::manager::ConnectionManager;
use crate::models::{NegotiationResponse, Transport};

// The hybrid groups add no new transport machinery: negotiation endpoints
// describe an ordered cascade, and the data endpoints route straight to the
// base handlers.

/// `GET /hybrid/ws-sse/negotiate`: WebSocket with SSE fallback.
pub async fn ws_sse_negotiate() -> HttpResponse {
    HttpResponse::Ok().json(NegotiationResponse {
        preferred: Transport::Websocket,
        fallback: vec![Transport::Sse],
        ws_url: Some("/hybrid/ws-sse/ws".to_string()),
        sse_url: Some("/hybrid/ws-sse/stream".to_string()),
        long_poll_url: None,
        short_poll_url: None,
        reason: "full duplex preferred; sse covers proxies that block upgrades".to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct HybridStreamQuery {
    pub client_id: Option<String>,
    pub timeout_s: Option<f64>,
}

/// `GET /hybrid/sse-lp/stream`: one URL, two transports.
///
/// Clients advertising `text/event-stream` get the infinite SSE stream;
/// everyone else gets a single long-poll cycle. Pure switch on the Accept
/// header, no shared state.
pub async fn sse_or_long_poll(
    req: HttpRequest,
    query: web::Query<HybridStreamQuery>,
    manager: web::Data<ConnectionManager>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let query = query.into_inner();
    let supports_sse = req
        .headers()
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.contains("text/event-stream"));

    if supports_sse {
        sse_stream(
            web::Query(SseQuery {
                client_id: query.client_id,
            }),
            manager,
            settings,
        )
        .await
    } else {
        long_poll(
            web::Query(LongPollQuery {
                client_id: query.client_id,
                timeout_s: query.timeout_s,
            }),
            manager,
            settings,
        )
        .await
    }
}

/// `GET /hybrid/ws-health/check`: REST health summary for the client's
/// secondary loop while its data rides the WebSocket.
pub async fn ws_health_check(manager: web::Data<ConnectionManager>) -> HttpResponse {
    let stats = manager.get_stats();
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "active_connections": stats.active_ws,
        "is_alive": true
    }))
}

/// `GET /hybrid/triple/negotiate`: the full WS -> SSE -> long-poll cascade.
pub async fn triple_negotiate() -> HttpResponse {
    HttpResponse::Ok().json(NegotiationResponse {
        preferred: Transport::Websocket,
        fallback: vec![Transport::Sse, Transport::LongPoll],
        ws_url: Some("/hybrid/triple/ws".to_string()),
        sse_url: Some("/hybrid/triple/stream".to_string()),
        long_poll_url: Some("/hybrid/triple/poll".to_string()),
        short_poll_url: None,
        reason: "try transports in order until one sticks".to_string(),
    })
}

/// Routes for all four hybrid groups, mounted under `/hybrid`.
pub fn config(cfg: &mut web::ServiceConfig) {
    use crate::handlers::websocket::ws_connect;

    cfg.route("/ws-sse/negotiate", web::get().to(ws_sse_negotiate))
        .route("/ws-sse/ws", web::get().to(ws_connect))
        .route("/ws-sse/stream", web::get().to(sse_stream))
        .route("/sse-lp/stream", web::get().to(sse_or_long_poll))
        .route("/ws-health/ws", web::get().to(ws_connect))
        .route("/ws-health/check", web::get().to(ws_health_check))
        .route("/triple/negotiate", web::get().to(triple_negotiate))
        .route("/triple/ws", web::get().to(ws_connect))
        .route("/triple/stream", web::get().to(sse_stream))
        .route("/triple/poll", web::get().to(long_poll));
}
