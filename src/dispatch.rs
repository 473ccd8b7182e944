use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::models::{Event, Transport};

/// The universal server-side dispatch loop, as a stream combinator.
///
/// Wraps a per-connection event source and guarantees the connection never
/// goes silent: whenever the source is idle for a full heartbeat interval,
/// a synthetic `heartbeat` event (source `system`, stamped with the owning
/// transport) is yielded instead. Real events reset the idle clock. When
/// the source ends, the stream ends with it.
///
/// SSE drives this over the client's queue; the WebSocket writer drives it
/// over an empty source, which degenerates it into the ping clock.
pub struct DispatchStream<S> {
    source: S,
    heartbeat: Interval,
    transport: Transport,
}

impl<S> DispatchStream<S> {
    pub fn new(source: S, heartbeat_interval: Duration, transport: Transport) -> Self {
        // interval_at skips the immediate first tick; heartbeats begin only
        // after a full idle interval.
        let mut heartbeat = interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            source,
            heartbeat,
            transport,
        }
    }
}

impl<S> Stream for DispatchStream<S>
where
    S: Stream<Item = Event> + Unpin,
{
    type Item = Event;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match Pin::new(&mut this.source).poll_next(cx) {
            Poll::Ready(Some(event)) => {
                this.heartbeat.reset();
                return Poll::Ready(Some(event));
            }
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => {}
        }

        match this.heartbeat.poll_tick(cx) {
            Poll::Ready(_) => Poll::Ready(Some(Event::heartbeat(this.transport))),
            Poll::Pending => Poll::Pending,
        }
    }
}
