use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Settings;
use crate::manager::ConnectionManager;
use crate::models::{PollResponse, PollStatus, Transport};
use crate::utils::ids;

/// Reconnect hint after a successful wake: come straight back.
const NEXT_POLL_AFTER_WAKE_MS: u64 = 50;
/// Reconnect hint after a timeout: brief pause before re-arming.
const NEXT_POLL_AFTER_TIMEOUT_MS: u64 = 500;
/// Upper bound on a caller-requested wait.
const MAX_TIMEOUT_S: f64 = 86_400.0;

#[derive(Debug, Deserialize)]
pub struct LongPollQuery {
    pub client_id: Option<String>,
    pub timeout_s: Option<f64>,
}

/// Unregisters the waiter on every exit path, including the request future
/// being dropped when the client hangs up mid-wait.
struct WaiterGuard {
    manager: web::Data<ConnectionManager>,
    client_id: String,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.manager.unregister_long_poll(&self.client_id);
        tracing::debug!(
            "client_id={} protocol=long_poll event=disconnect reason=cleanup",
            self.client_id
        );
    }
}

/// `GET /poll/long`: held-open request that blocks until an event arrives
/// or the timeout lapses.
///
/// On wake the response carries only the latest ring entry; events that
/// arrived earlier in the same wait window stay in the ring for the
/// client's next poll.
pub async fn long_poll(
    query: web::Query<LongPollQuery>,
    manager: web::Data<ConnectionManager>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let query = query.into_inner();
    let client_id = ids::client_or_generated(query.client_id);
    tracing::debug!("client_id={} protocol=long_poll event=connect", client_id);

    let timeout = effective_timeout(query.timeout_s, settings.long_poll_timeout_s);
    let waiter = manager.register_long_poll(&client_id);
    let _guard = WaiterGuard {
        manager: manager.clone(),
        client_id: client_id.clone(),
    };

    match tokio::time::timeout(timeout, waiter.notified()).await {
        Ok(()) => {
            let events = manager
                .latest_event()
                .map(|event| event.stamped(Transport::LongPoll))
                .into_iter()
                .collect();
            HttpResponse::Ok().json(PollResponse {
                events,
                status: PollStatus::Ok,
                next_poll_ms: NEXT_POLL_AFTER_WAKE_MS,
                server_time: Utc::now(),
            })
        }
        Err(_) => HttpResponse::Ok().json(PollResponse {
            events: Vec::new(),
            status: PollStatus::Timeout,
            next_poll_ms: NEXT_POLL_AFTER_TIMEOUT_MS,
            server_time: Utc::now(),
        }),
    }
}

/// Clamp the requested wait to something sane; non-finite or negative
/// values fall back to the configured default.
fn effective_timeout(requested: Option<f64>, default_s: f64) -> Duration {
    let secs = match requested {
        Some(t) if t.is_finite() && t >= 0.0 => t.min(MAX_TIMEOUT_S),
        Some(_) | None => default_s,
    };
    Duration::from_secs_f64(secs)
}
