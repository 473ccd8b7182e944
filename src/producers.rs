use actix_web::web;
use rand::Rng;
use serde_json::json;
use std::time::Duration;

use crate::manager::ConnectionManager;
use crate::models::{Event, EventType};

// Infinite background producers of realistic fake traffic. In a real
// deployment these would be webhook handlers, CDC streams or queue
// consumers; here they keep constant, varied pressure on the fan-out.
//
// Each loop scopes its RNG so no generator state is held across an await.

/// Ticker symbols with price deltas every 0.5-2s.
pub async fn stock_ticker(manager: web::Data<ConnectionManager>) {
    const SYMBOLS: [&str; 5] = ["AAPL", "NVDA", "TSLA", "MSFT", "AMZN"];
    let mut prices: Vec<f64> = {
        let mut rng = rand::thread_rng();
        SYMBOLS.iter().map(|_| rng.gen_range(100.0..900.0)).collect()
    };

    loop {
        let (event, pause) = {
            let mut rng = rand::thread_rng();
            let idx = rng.gen_range(0..SYMBOLS.len());
            let delta: f64 = rng.gen_range(-2.5..2.5);
            prices[idx] += delta;
            let event = Event::new(
                EventType::StockTick,
                json!({
                    "ticker": SYMBOLS[idx],
                    "price": round2(prices[idx]),
                    "delta": round2(delta),
                    "volume": rng.gen_range(100..15_000),
                    "market": "NASDAQ"
                }),
                "stocks",
            );
            (event, Duration::from_secs_f64(rng.gen_range(0.5..2.0)))
        };
        manager.push_event(event);
        tokio::time::sleep(pause).await;
    }
}

/// Bursty sports events at irregular 1-5s intervals.
pub async fn live_scores(manager: web::Data<ConnectionManager>) {
    const MATCHES: [(&str, &str); 3] = [
        ("Manchester", "Arsenal"),
        ("Lakers", "Warriors"),
        ("Madrid", "Barcelona"),
    ];
    const ACTIONS: [&str; 4] = ["GOAL", "SUBSTITUTION", "FOUL", "TIMEOUT"];

    loop {
        let (event, pause) = {
            let mut rng = rand::thread_rng();
            let (home, away) = MATCHES[rng.gen_range(0..MATCHES.len())];
            let team = if rng.gen_bool(0.5) { home } else { away };
            let event = Event::new(
                EventType::ScoreUpdate,
                json!({
                    "match": format!("{} vs {}", home, away),
                    "action": ACTIONS[rng.gen_range(0..ACTIONS.len())],
                    "team": team,
                    "minute": rng.gen_range(1..=90)
                }),
                "sports",
            );
            (event, Duration::from_secs_f64(rng.gen_range(1.0..5.0)))
        };
        manager.push_event(event);
        tokio::time::sleep(pause).await;
    }
}

/// CPU/memory random walk, one sample per second.
pub async fn system_metrics(manager: web::Data<ConnectionManager>) {
    let mut cpu: f64 = 40.0;
    let mut mem: f64 = 60.0;

    loop {
        let event = {
            let mut rng = rand::thread_rng();
            cpu = (cpu + rng.gen_range(-5.0..5.0)).clamp(0.0, 100.0);
            mem = (mem + rng.gen_range(-2.0..2.0)).clamp(0.0, 100.0);
            Event::new(
                EventType::Metric,
                json!({
                    "cpu_percent": round1(cpu),
                    "memory_percent": round1(mem),
                    "disk_io": rng.gen_range(0..1000)
                }),
                "metrics",
            )
        };
        manager.push_event(event);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// User notifications at random 2-8s intervals.
pub async fn notifications(manager: web::Data<ConnectionManager>) {
    const USERS: [&str; 4] = ["@alice", "@bob", "@charlie", "@dave"];
    const ACTIONS: [&str; 4] = [
        "liked your post",
        "mentioned you",
        "sent a friend request",
        "placed order #4821",
    ];

    loop {
        let (event, pause) = {
            let mut rng = rand::thread_rng();
            let event = Event::new(
                EventType::Notification,
                json!({
                    "user": USERS[rng.gen_range(0..USERS.len())],
                    "action": ACTIONS[rng.gen_range(0..ACTIONS.len())]
                }),
                "social",
            );
            (event, Duration::from_secs_f64(rng.gen_range(2.0..8.0)))
        };
        manager.push_event(event);
        tokio::time::sleep(pause).await;
    }
}

/// Slow-moving weather data every 5s.
pub async fn weather(manager: web::Data<ConnectionManager>) {
    let mut temperature: f64 = 22.0;

    loop {
        let event = {
            let mut rng = rand::thread_rng();
            temperature += rng.gen_range(-0.5..0.5);
            Event::new(
                EventType::Weather,
                json!({
                    "temperature": round1(temperature),
                    "wind_kph": rng.gen_range(5..=30),
                    "uv_index": rng.gen_range(1..=11)
                }),
                "weather",
            )
        };
        manager.push_event(event);
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
