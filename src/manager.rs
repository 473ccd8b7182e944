use actix::{Message, Recipient};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;

use crate::models::{ConnectionStats, Event, Transport};

/// How many recent events the ring buffer keeps for stateless pollers.
pub const RING_CAPACITY: usize = 200;
/// Per-SSE-client mailbox size. A slow consumer drops new events past this.
pub const SSE_QUEUE_CAPACITY: usize = 100;

/// Actor message carrying one event to a WebSocket connection.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct Deliver(pub Event);

/// The central state registry and fan-out engine.
///
/// Holds every active WebSocket address, every per-SSE-client queue, every
/// waiting long-poll signal, and the rolling buffer of recent events that
/// stateless pollers read from. `push_event` distributes one event to all
/// of them in a fixed order.
///
/// All registries are guarded by their own mutex; no lock is held across a
/// suspension point, so `push_event` never blocks the producer path.
pub struct ConnectionManager {
    websockets: Mutex<HashMap<String, Recipient<Deliver>>>,
    sse_queues: Mutex<HashMap<String, mpsc::Sender<Event>>>,
    long_poll_waiters: Mutex<HashMap<String, Arc<Notify>>>,
    recent_events: Mutex<VecDeque<Event>>,
    total_dispatched: AtomicU64,
    started_at: Instant,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            websockets: Mutex::new(HashMap::new()),
            sse_queues: Mutex::new(HashMap::new()),
            long_poll_waiters: Mutex::new(HashMap::new()),
            recent_events: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            total_dispatched: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // ==========================
    // WebSocket registry
    // ==========================

    pub fn connect_ws(&self, client_id: &str, sink: Recipient<Deliver>) {
        let mut sockets = self.websockets.lock().unwrap();
        sockets.insert(client_id.to_string(), sink);
        tracing::info!(
            "client_id={} protocol=websocket event=connect reason=accepted",
            client_id
        );
    }

    pub fn disconnect_ws(&self, client_id: &str) {
        let mut sockets = self.websockets.lock().unwrap();
        if sockets.remove(client_id).is_some() {
            tracing::info!(
                "client_id={} protocol=websocket event=disconnect reason=cleanup",
                client_id
            );
        }
    }

    // ==========================
    // SSE registry
    // ==========================

    /// Give the client a dedicated bounded queue. The sender side lives in
    /// the registry; the returned receiver feeds the client's SSE stream.
    pub fn subscribe_sse(&self, client_id: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SSE_QUEUE_CAPACITY);
        let mut queues = self.sse_queues.lock().unwrap();
        queues.insert(client_id.to_string(), tx);
        tracing::info!(
            "client_id={} protocol=sse event=connect reason=subscribed",
            client_id
        );
        rx
    }

    pub fn unsubscribe_sse(&self, client_id: &str) {
        let mut queues = self.sse_queues.lock().unwrap();
        if queues.remove(client_id).is_some() {
            tracing::info!(
                "client_id={} protocol=sse event=disconnect reason=cleanup",
                client_id
            );
        }
    }

    // ==========================
    // Long-poll registry
    // ==========================

    /// One-shot signal armed by the next `push_event`. Arming is idempotent:
    /// repeated notifies before the waiter wakes collapse into one permit.
    pub fn register_long_poll(&self, client_id: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        let mut waiters = self.long_poll_waiters.lock().unwrap();
        waiters.insert(client_id.to_string(), notify.clone());
        tracing::debug!(
            "client_id={} protocol=long_poll event=wait reason=registered",
            client_id
        );
        notify
    }

    pub fn unregister_long_poll(&self, client_id: &str) {
        let mut waiters = self.long_poll_waiters.lock().unwrap();
        waiters.remove(client_id);
    }

    // ==========================
    // Ring buffer access
    // ==========================

    /// Consistent snapshot of the ring, oldest first.
    pub fn recent_events(&self) -> Vec<Event> {
        let ring = self.recent_events.lock().unwrap();
        ring.iter().cloned().collect()
    }

    pub fn latest_event(&self) -> Option<Event> {
        let ring = self.recent_events.lock().unwrap();
        ring.back().cloned()
    }

    // ==========================
    // Central fan-out
    // ==========================

    /// Distribute one event to every storage mechanism, in a fixed order:
    /// ring buffer, long-poll signals, SSE queues, WebSocket sinks.
    ///
    /// This call is total: a misbehaving subscriber is dropped or skipped,
    /// never allowed to fail the fan-out or block the producer.
    pub fn push_event(&self, event: Event) {
        self.total_dispatched.fetch_add(1, Ordering::Relaxed);

        // 1. Store in the ring buffer (for pollers to grab), evicting the
        //    oldest entry once at capacity.
        {
            let mut ring = self.recent_events.lock().unwrap();
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        // 2. Wake up long pollers. Waiters unregister themselves after
        //    waking, so the registry is left alone here.
        {
            let waiters = self.long_poll_waiters.lock().unwrap();
            for waiter in waiters.values() {
                waiter.notify_one();
            }
        }

        // 3. Queue for SSE streams. try_send keeps the fan-out non-blocking;
        //    a full queue drops the newest arrival for that client only.
        {
            let stamped = event.stamped(Transport::Sse);
            let queues = self.sse_queues.lock().unwrap();
            for (client_id, queue) in queues.iter() {
                match queue.try_send(stamped.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            "client_id={} protocol=sse event=dropped reason=queue_full",
                            client_id
                        );
                    }
                    // Receiver already gone; the stream's Drop unsubscribes.
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }

        // 4. Push directly to open WebSockets. A failed send marks the
        //    client for removal after the iteration.
        {
            let stamped = event.stamped(Transport::Websocket);
            let mut sockets = self.websockets.lock().unwrap();
            let mut disconnected = Vec::new();
            for (client_id, sink) in sockets.iter() {
                if let Err(err) = sink.try_send(Deliver(stamped.clone())) {
                    tracing::warn!(
                        "client_id={} protocol=websocket event=error reason={}",
                        client_id,
                        err
                    );
                    disconnected.push(client_id.clone());
                }
            }
            for client_id in disconnected {
                sockets.remove(&client_id);
                tracing::info!(
                    "client_id={} protocol=websocket event=disconnect reason=send_failure",
                    client_id
                );
            }
        }
    }

    // ==========================
    // Metrics
    // ==========================

    pub fn get_stats(&self) -> ConnectionStats {
        ConnectionStats {
            active_ws: self.websockets.lock().unwrap().len(),
            active_sse: self.sse_queues.lock().unwrap().len(),
            pending_long_polls: self.long_poll_waiters.lock().unwrap().len(),
            total_events_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            uptime_s: self.started_at.elapsed().as_secs_f64(),
            server_time: Utc::now(),
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use actix::{Actor, ActorContext, Context, Handler};
    use serde_json::json;
    use std::time::Duration;

    fn test_event(tag: &str) -> Event {
        Event::new(EventType::Metric, json!({ "tag": tag }), "test")
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let manager = ConnectionManager::new();
        let mut ids = Vec::new();
        for i in 0..RING_CAPACITY + 5 {
            let event = test_event(&i.to_string());
            ids.push(event.event_id.clone());
            manager.push_event(event);
        }

        let snapshot = manager.recent_events();
        assert_eq!(snapshot.len(), RING_CAPACITY);
        // The five oldest fell off the front
        assert_eq!(snapshot[0].event_id, ids[5]);
        assert_eq!(snapshot.last().unwrap().event_id, *ids.last().unwrap());
    }

    #[test]
    fn test_ring_preserves_insertion_order() {
        let manager = ConnectionManager::new();
        let events: Vec<Event> = (0..20).map(|i| test_event(&i.to_string())).collect();
        for event in &events {
            manager.push_event(event.clone());
        }
        let snapshot = manager.recent_events();
        for (stored, pushed) in snapshot.iter().zip(events.iter()) {
            assert_eq!(stored.event_id, pushed.event_id);
        }
    }

    #[test]
    fn test_stats_count_dispatches_and_registrations() {
        let manager = ConnectionManager::new();
        for i in 0..7 {
            manager.push_event(test_event(&i.to_string()));
        }
        let _rx = manager.subscribe_sse("sse-1");
        let _waiter = manager.register_long_poll("lp-1");

        let stats = manager.get_stats();
        assert_eq!(stats.total_events_dispatched, 7);
        assert_eq!(stats.active_sse, 1);
        assert_eq!(stats.pending_long_polls, 1);
        assert_eq!(stats.active_ws, 0);

        manager.unsubscribe_sse("sse-1");
        manager.unregister_long_poll("lp-1");
        let stats = manager.get_stats();
        assert_eq!(stats.active_sse, 0);
        assert_eq!(stats.pending_long_polls, 0);
    }

    #[tokio::test]
    async fn test_sse_queue_receives_stamped_copies() {
        let manager = ConnectionManager::new();
        let mut rx = manager.subscribe_sse("sse-1");

        let original = test_event("a");
        manager.push_event(original.clone());

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.event_id, original.event_id);
        assert_eq!(delivered.protocol, Transport::Sse);
        // The ring copy keeps the producer stamp
        assert_eq!(manager.latest_event().unwrap().protocol, Transport::Internal);
    }

    #[tokio::test]
    async fn test_slow_sse_consumer_drops_overflow_only() {
        let manager = ConnectionManager::new();
        let mut slow = manager.subscribe_sse("slow");

        for i in 0..SSE_QUEUE_CAPACITY + 50 {
            manager.push_event(test_event(&i.to_string()));
        }

        // The slow consumer got exactly the queue capacity, in order.
        let mut received = Vec::new();
        while let Ok(event) = slow.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), SSE_QUEUE_CAPACITY);
        for (i, event) in received.iter().enumerate() {
            assert_eq!(event.payload["tag"], i.to_string());
        }

        // The ring still saw everything.
        assert_eq!(
            manager.get_stats().total_events_dispatched,
            (SSE_QUEUE_CAPACITY + 50) as u64
        );
    }

    #[tokio::test]
    async fn test_long_poll_waiter_wakes_on_push() {
        let manager = ConnectionManager::new();
        let waiter = manager.register_long_poll("lp-1");

        manager.push_event(test_event("wake"));

        // The permit is stored, so the wait resolves immediately.
        tokio::time::timeout(Duration::from_millis(100), waiter.notified())
            .await
            .expect("waiter should have been woken");
        manager.unregister_long_poll("lp-1");
    }

    #[tokio::test]
    async fn test_long_poll_arming_is_idempotent() {
        let manager = ConnectionManager::new();
        let waiter = manager.register_long_poll("lp-1");

        // Burst of events before the waiter polls: one permit, no error.
        for i in 0..5 {
            manager.push_event(test_event(&i.to_string()));
        }
        tokio::time::timeout(Duration::from_millis(100), waiter.notified())
            .await
            .expect("waiter should have been woken once");
        manager.unregister_long_poll("lp-1");
    }

    // Minimal sink actor for exercising the WebSocket registry.
    struct Sink {
        received: Arc<Mutex<Vec<Event>>>,
    }

    impl Actor for Sink {
        type Context = Context<Self>;
    }

    impl Handler<Deliver> for Sink {
        type Result = ();

        fn handle(&mut self, msg: Deliver, _ctx: &mut Self::Context) {
            self.received.lock().unwrap().push(msg.0);
        }
    }

    #[derive(Message)]
    #[rtype(result = "()")]
    struct Stop;

    impl Handler<Stop> for Sink {
        type Result = ();

        fn handle(&mut self, _msg: Stop, ctx: &mut Self::Context) {
            ctx.stop();
        }
    }

    #[actix_rt::test]
    async fn test_ws_delivery_carries_websocket_stamp() {
        let manager = ConnectionManager::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let addr = Sink {
            received: received.clone(),
        }
        .start();
        manager.connect_ws("ws-1", addr.recipient());

        let original = test_event("a");
        manager.push_event(original.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let delivered = received.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].event_id, original.event_id);
        assert_eq!(delivered[0].protocol, Transport::Websocket);
    }

    #[actix_rt::test]
    async fn test_dead_ws_sink_is_removed_on_send_failure() {
        let manager = ConnectionManager::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let addr = Sink {
            received: received.clone(),
        }
        .start();
        manager.connect_ws("ws-1", addr.clone().recipient());
        assert_eq!(manager.get_stats().active_ws, 1);

        addr.send(Stop).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // First push after death hits the closed mailbox and evicts.
        manager.push_event(test_event("a"));
        assert_eq!(manager.get_stats().active_ws, 0);
    }
}
