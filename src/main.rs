use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use relaycast::config::Settings;
use relaycast::handlers;
use relaycast::lifecycle::{ProducerSet, SHUTDOWN_GRACE};
use relaycast::manager::ConnectionManager;
use relaycast::middleware::Timing;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    let settings = Settings::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let manager = web::Data::new(ConnectionManager::new());
    let settings_data = web::Data::new(settings.clone());

    // Producers run for the whole server lifetime; the handles are kept so
    // shutdown can cancel and drain them.
    let producers = ProducerSet::spawn(manager.clone());

    tracing::info!("event delivery server listening on 0.0.0.0:{}", settings.port);

    let app_manager = manager.clone();
    let app_settings = settings_data.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Timing)
            .wrap(cors)
            .app_data(app_manager.clone())
            .app_data(app_settings.clone())
            // Base transports
            .route("/poll/short", web::get().to(handlers::short_poll))
            .route("/poll/long", web::get().to(handlers::long_poll))
            .route("/sse/stream", web::get().to(handlers::sse_stream))
            .route("/ws/connect", web::get().to(handlers::ws_connect))
            // Hybrid combinators
            .service(web::scope("/hybrid").configure(handlers::hybrid::config))
            // Ops
            .route("/healthz", web::get().to(handlers::healthz))
            .route("/stats", web::get().to(handlers::stats))
    })
    .bind(("0.0.0.0", settings.port))?
    .run()
    .await?;

    producers.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}
