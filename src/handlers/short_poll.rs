use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;

use crate::config::Settings;
use crate::manager::ConnectionManager;
use crate::models::{Event, PollResponse, PollStatus, Transport};
use crate::utils::ids;

/// How many events a client with no cursor gets on its first poll.
const COLD_START_BATCH: usize = 10;

#[derive(Debug, Deserialize)]
pub struct ShortPollQuery {
    pub client_id: Option<String>,
    pub last_seen_id: Option<String>,
}

/// `GET /poll/short`: stateless snapshot poll, never blocks.
///
/// Without a cursor the client gets the most recent events. With a cursor
/// it gets everything strictly after it. A cursor that has fallen off the
/// ring gets an empty `ok` response: the client must resume from "now".
pub async fn short_poll(
    query: web::Query<ShortPollQuery>,
    manager: web::Data<ConnectionManager>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let query = query.into_inner();
    let client_id = ids::client_or_generated(query.client_id);
    tracing::debug!("client_id={} protocol=short_poll event=poll", client_id);

    let snapshot = manager.recent_events();
    let (fresh, cursor_evicted) = match query.last_seen_id.as_deref() {
        None => {
            let skip = snapshot.len().saturating_sub(COLD_START_BATCH);
            (snapshot[skip..].to_vec(), false)
        }
        Some(cursor) => match snapshot.iter().position(|e| e.event_id == cursor) {
            Some(idx) => (snapshot[idx + 1..].to_vec(), false),
            None => (Vec::new(), true),
        },
    };

    let events: Vec<Event> = fresh
        .iter()
        .map(|event| event.stamped(Transport::ShortPoll))
        .collect();

    let status = if !events.is_empty() || cursor_evicted {
        PollStatus::Ok
    } else {
        PollStatus::Empty
    };

    HttpResponse::Ok()
        .append_header((
            "X-Poll-Interval",
            settings.short_poll_interval_ms.to_string(),
        ))
        .json(PollResponse {
            events,
            status,
            next_poll_ms: settings.short_poll_interval_ms,
            server_time: Utc::now(),
        })
}
