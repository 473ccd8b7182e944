use actix::{Actor, ActorContext, AsyncContext, Handler, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures::stream;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::dispatch::DispatchStream;
use crate::manager::{ConnectionManager, Deliver};
use crate::models::{Event, Transport};
use crate::utils::ids;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub client_id: Option<String>,
}

/// Recognized client -> server frames. Everything else is ignored.
#[derive(Debug, PartialEq, Eq)]
enum ClientFrame {
    Pong,
    Subscribe,
    Unknown,
}

fn parse_client_frame(raw: &str) -> ClientFrame {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return ClientFrame::Unknown,
    };
    if value.get("type").and_then(|v| v.as_str()) == Some("pong") {
        return ClientFrame::Pong;
    }
    if value.get("action").and_then(|v| v.as_str()) == Some("subscribe") {
        return ClientFrame::Subscribe;
    }
    ClientFrame::Unknown
}

/// One WebSocket connection. The fan-out delivers events through the
/// actor's mailbox (`Deliver`); the dispatch loop over an empty source
/// provides the ping clock. A ping that goes unanswered past the pong
/// deadline marks the connection as a zombie and closes it.
pub struct EventSocket {
    client_id: String,
    manager: web::Data<ConnectionManager>,
    heartbeat_interval: Duration,
    pong_timeout: Duration,
    last_pong: Instant,
    awaiting_pong: bool,
}

impl EventSocket {
    pub fn new(
        client_id: String,
        manager: web::Data<ConnectionManager>,
        settings: &Settings,
    ) -> Self {
        Self {
            client_id,
            manager,
            heartbeat_interval: settings.ws_heartbeat_interval(),
            pong_timeout: settings.ws_pong_timeout(),
            last_pong: Instant::now(),
            awaiting_pong: false,
        }
    }

    fn record_pong(&mut self) {
        self.last_pong = Instant::now();
        self.awaiting_pong = false;
    }

    fn send_ping(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.text(r#"{"type":"ping"}"#);
        self.awaiting_pong = true;
        ctx.run_later(self.pong_timeout, |act, ctx| {
            if act.awaiting_pong {
                tracing::warn!(
                    "client_id={} protocol=websocket event=zombie reason=pong_deadline last_pong_s={:.1}",
                    act.client_id,
                    act.last_pong.elapsed().as_secs_f64()
                );
                ctx.close(Some((ws::CloseCode::Away, "pong deadline exceeded").into()));
                ctx.stop();
            }
        });
    }

    fn handle_client_frame(&mut self, raw: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match parse_client_frame(raw) {
            ClientFrame::Pong => self.record_pong(),
            ClientFrame::Subscribe => {
                ctx.text(r#"{"type":"control","status":"subscribed"}"#);
            }
            ClientFrame::Unknown => {
                tracing::debug!(
                    "client_id={} protocol=websocket event=ignored_frame",
                    self.client_id
                );
            }
        }
    }
}

impl Actor for EventSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.manager
            .connect_ws(&self.client_id, ctx.address().recipient());
        // Empty source: the dispatch loop degenerates into the ping clock.
        ctx.add_stream(DispatchStream::new(
            stream::pending::<Event>(),
            self.heartbeat_interval,
            Transport::Websocket,
        ));
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        self.manager.disconnect_ws(&self.client_id);
        Running::Stop
    }
}

/// Writer path: events fanned out by the connection manager, already
/// stamped `websocket`.
impl Handler<Deliver> for EventSocket {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(err) => {
                tracing::warn!(
                    "client_id={} protocol=websocket event=error reason=serialize:{}",
                    self.client_id,
                    err
                );
            }
        }
    }
}

/// Idle ticks from the shared dispatch loop become ping frames.
impl StreamHandler<Event> for EventSocket {
    fn handle(&mut self, _heartbeat: Event, ctx: &mut Self::Context) {
        self.send_ping(ctx);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {
        // Ping clock never ends; connection lifetime is owned by the
        // websocket stream below.
    }
}

/// Reader path: client frames.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for EventSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_client_frame(&text, ctx),
            Ok(ws::Message::Ping(payload)) => {
                self.record_pong();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => self.record_pong(),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    "client_id={} protocol=websocket event=error reason={}",
                    self.client_id,
                    err
                );
                ctx.stop();
            }
        }
    }
}

/// `GET /ws/connect`: upgrade to a full-duplex socket.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    manager: web::Data<ConnectionManager>,
    settings: web::Data<Settings>,
) -> Result<HttpResponse, Error> {
    let client_id = ids::client_or_generated(query.into_inner().client_id);
    let socket = EventSocket::new(client_id, manager.clone(), &settings);
    ws::start(socket, &req, stream)
}
