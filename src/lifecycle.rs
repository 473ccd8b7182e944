use actix_web::rt::task::JoinHandle;
use actix_web::web;
use std::time::Duration;

use crate::manager::ConnectionManager;
use crate::producers;

/// How long shutdown waits for a cancelled producer before giving up on it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns the background producer tasks: spawned before the server starts
/// accepting, cancelled and drained after it stops.
pub struct ProducerSet {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl ProducerSet {
    pub fn spawn(manager: web::Data<ConnectionManager>) -> Self {
        let handles = vec![
            (
                "stocks",
                actix_web::rt::spawn(producers::stock_ticker(manager.clone())),
            ),
            (
                "sports",
                actix_web::rt::spawn(producers::live_scores(manager.clone())),
            ),
            (
                "metrics",
                actix_web::rt::spawn(producers::system_metrics(manager.clone())),
            ),
            (
                "social",
                actix_web::rt::spawn(producers::notifications(manager.clone())),
            ),
            (
                "weather",
                actix_web::rt::spawn(producers::weather(manager)),
            ),
        ];
        tracing::info!("started {} background producers", handles.len());
        Self { handles }
    }

    /// Cancel every producer and wait out its termination, bounded by the
    /// grace period per task.
    pub async fn shutdown(self, grace: Duration) {
        tracing::info!("shutting down, cancelling background producers");
        for (_, handle) in &self.handles {
            handle.abort();
        }
        for (name, handle) in self.handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_cancelled() => {}
                Ok(Err(err)) => {
                    tracing::error!("producer {} failed: {}", name, err);
                }
                Err(_) => {
                    tracing::error!(
                        "producer {} did not stop within {:?} grace period",
                        name,
                        grace
                    );
                }
            }
        }
        tracing::info!("shutdown complete");
    }
}
