use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// Exponential backoff schedule for client-side reconnect loops.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(32),
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, max)` with +/-10% jitter so herds of clients
    /// don't reconnect in lockstep.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self.base.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exponential.min(self.max.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.9..=1.1);
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Repeatedly invoke a connect function until the wall-clock duration
/// elapses, backing off between failures. A successful connect resets the
/// attempt counter, so a flapping transport pays the short delays again.
pub async fn run_with_reconnect<F, Fut, E>(policy: ReconnectPolicy, wall_clock: Duration, mut connect: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let deadline = Instant::now() + wall_clock;
    let mut attempt: u32 = 0;

    while Instant::now() < deadline {
        match connect().await {
            Ok(()) => {
                attempt = 0;
            }
            Err(err) => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    "event=reconnect attempt={} delay_ms={} reason={}",
                    attempt,
                    delay.as_millis(),
                    err
                );
                attempt = attempt.saturating_add(1);
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(delay.min(remaining)).await;
            }
        }
    }
}
