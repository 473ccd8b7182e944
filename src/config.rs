/// Configuration loaded from environment variables
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Protocol timings and server settings, loaded once at startup and shared
/// as app data. Every value has a default so the server runs out of the box.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_level: String,

    // Short polling
    pub short_poll_interval_ms: u64,

    // Long polling
    pub long_poll_timeout_s: f64,

    // SSE
    pub sse_heartbeat_interval_s: f64,

    // WebSocket
    pub ws_heartbeat_interval_s: f64,
    pub ws_pong_timeout_s: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8000,
            log_level: "INFO".to_string(),
            short_poll_interval_ms: 2000,
            long_poll_timeout_s: 30.0,
            sse_heartbeat_interval_s: 15.0,
            ws_heartbeat_interval_s: 30.0,
            ws_pong_timeout_s: 5.0,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Self {
            port: parse_var("PORT", defaults.port),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            short_poll_interval_ms: parse_var(
                "SHORT_POLL_INTERVAL_MS",
                defaults.short_poll_interval_ms,
            ),
            long_poll_timeout_s: parse_var("LONG_POLL_TIMEOUT_S", defaults.long_poll_timeout_s),
            sse_heartbeat_interval_s: parse_var(
                "SSE_HEARTBEAT_INTERVAL_S",
                defaults.sse_heartbeat_interval_s,
            ),
            ws_heartbeat_interval_s: parse_var(
                "WS_HEARTBEAT_INTERVAL_S",
                defaults.ws_heartbeat_interval_s,
            ),
            ws_pong_timeout_s: parse_var("WS_PONG_TIMEOUT_S", defaults.ws_pong_timeout_s),
        }
    }

    pub fn sse_heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sse_heartbeat_interval_s)
    }

    pub fn ws_heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.ws_heartbeat_interval_s)
    }

    pub fn ws_pong_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ws_pong_timeout_s)
    }
}

/// Parse an environment variable, falling back to the default when the
/// variable is absent or unparseable. A bad value must not abort startup.
fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "invalid value for {}: {:?}, using default {}",
                name,
                raw,
                default
            );
            default
        }),
        Err(_) => default,
    }
}
