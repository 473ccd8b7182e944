use actix_web::{web, HttpResponse};
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Settings;
use crate::dispatch::DispatchStream;
use crate::manager::ConnectionManager;
use crate::models::{Event, EventType, Transport};
use crate::utils::ids;

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    pub client_id: Option<String>,
}

/// One client's event-stream: the dispatch loop over its bounded queue,
/// framed into SSE wire chunks. Dropping the stream (client disconnect or
/// server shutdown) unsubscribes the client and its queue dies with it.
pub struct SseStream {
    events: DispatchStream<ReceiverStream<Event>>,
    client_id: String,
    manager: web::Data<ConnectionManager>,
}

impl SseStream {
    pub fn new(
        events: DispatchStream<ReceiverStream<Event>>,
        client_id: String,
        manager: web::Data<ConnectionManager>,
    ) -> Self {
        Self {
            events,
            client_id,
            manager,
        }
    }
}

/// Wire framing: `event:` / `id:` / `data:` terminated by a blank line.
/// Heartbeats carry a minimal payload instead of the full event JSON.
fn frame(event: &Event) -> String {
    let data = if event.event_type == EventType::Heartbeat {
        "{\"ping\": \"pong\"}".to_string()
    } else {
        serde_json::to_string(event).unwrap_or_default()
    };
    format!(
        "event: {}\nid: {}\ndata: {}\n\n",
        event.event_type, event.event_id, data
    )
}

impl Stream for SseStream {
    type Item = Result<web::Bytes, actix_web::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.events).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                Poll::Ready(Some(Ok(web::Bytes::from(frame(&event)))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        self.manager.unsubscribe_sse(&self.client_id);
    }
}

/// `GET /sse/stream`: held-open text/event-stream subscription.
pub async fn sse_stream(
    query: web::Query<SseQuery>,
    manager: web::Data<ConnectionManager>,
    settings: web::Data<Settings>,
) -> HttpResponse {
    let client_id = ids::client_or_generated(query.into_inner().client_id);
    let receiver = manager.subscribe_sse(&client_id);
    let events = DispatchStream::new(
        ReceiverStream::new(receiver),
        settings.sse_heartbeat_interval(),
        Transport::Sse,
    );
    let stream = SseStream::new(events, client_id, manager.clone());

    HttpResponse::Ok()
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Connection", "keep-alive"))
        .append_header(("X-Accel-Buffering", "no")) // Disable nginx buffering
        .streaming(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn subscribed_stream(
        manager: &web::Data<ConnectionManager>,
        client_id: &str,
        heartbeat: Duration,
    ) -> SseStream {
        let receiver = manager.subscribe_sse(client_id);
        SseStream::new(
            DispatchStream::new(ReceiverStream::new(receiver), heartbeat, Transport::Sse),
            client_id.to_string(),
            manager.clone(),
        )
    }

    #[actix_web::test]
    async fn test_frame_carries_type_id_and_json_event() {
        let manager = web::Data::new(ConnectionManager::new());
        let mut stream = subscribed_stream(&manager, "sse-1", Duration::from_secs(60));

        let event = Event::new(EventType::StockTick, json!({ "ticker": "AAPL" }), "stocks");
        manager.push_event(event.clone());

        let chunk = stream.next().await.unwrap().unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        assert!(text.starts_with("event: stock_tick\n"));
        assert!(text.contains(&format!("id: {}\n", event.event_id)));
        assert!(text.ends_with("\n\n"));

        let data_line = text
            .lines()
            .find(|line| line.starts_with("data: "))
            .unwrap();
        let decoded: Event = serde_json::from_str(&data_line["data: ".len()..]).unwrap();
        assert_eq!(decoded.protocol, Transport::Sse);
        assert_eq!(decoded.event_id, event.event_id);
    }

    #[actix_web::test]
    async fn test_idle_stream_emits_heartbeat_frame() {
        let manager = web::Data::new(ConnectionManager::new());
        let mut stream = subscribed_stream(&manager, "sse-1", Duration::from_millis(30));

        let chunk = tokio::time::timeout(Duration::from_millis(500), stream.next())
            .await
            .expect("heartbeat frame should arrive")
            .unwrap()
            .unwrap();
        let text = std::str::from_utf8(&chunk).unwrap();
        assert!(text.starts_with("event: heartbeat\n"));
        assert!(text.contains("data: {\"ping\": \"pong\"}\n"));
    }

    #[actix_web::test]
    async fn test_events_arrive_in_insertion_order() {
        let manager = web::Data::new(ConnectionManager::new());
        let mut stream = subscribed_stream(&manager, "sse-1", Duration::from_secs(60));

        for i in 0..5 {
            manager.push_event(Event::new(EventType::Metric, json!({ "seq": i }), "test"));
        }
        for i in 0..5 {
            let chunk = stream.next().await.unwrap().unwrap();
            let text = std::str::from_utf8(&chunk).unwrap();
            assert!(text.contains(&format!("\"seq\":{}", i)));
        }
    }

    #[actix_web::test]
    async fn test_drop_unsubscribes_client() {
        let manager = web::Data::new(ConnectionManager::new());
        let stream = subscribed_stream(&manager, "sse-1", Duration::from_secs(60));
        assert_eq!(manager.get_stats().active_sse, 1);

        drop(stream);
        assert_eq!(manager.get_stats().active_sse, 0);
    }

    #[actix_web::test]
    async fn test_endpoint_responds_with_event_stream_headers() {
        let manager = web::Data::new(ConnectionManager::new());
        let app = test::init_service(
            App::new()
                .app_data(manager.clone())
                .app_data(web::Data::new(Settings::default()))
                .route("/sse/stream", web::get().to(sse_stream)),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/sse/stream?client_id=sse-1")
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(resp.headers().get("X-Accel-Buffering").unwrap(), "no");
        assert_eq!(manager.get_stats().active_sse, 1);
    }
}
