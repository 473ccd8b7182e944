use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::manager::ConnectionManager;

/// `GET /healthz`: liveness probe.
pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// `GET /stats`: point-in-time connection and dispatch counters.
pub async fn stats(manager: web::Data<ConnectionManager>) -> HttpResponse {
    HttpResponse::Ok().json(manager.get_stats())
}
