use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use super::Metrics;

/// Serves `/metrics` and `/health` for the order service.
/// Runs on its own runtime; `main` starts it from a dedicated thread.
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    let metrics = web::Data::from(metrics);
    HttpServer::new(move || App::new().configure(routes(metrics.clone())))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}

fn routes(metrics: web::Data<Metrics>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(metrics)
            .route("/metrics", web::get().to(scrape))
            .route("/health", web::get().to(health));
    }
}

async fn scrape(metrics: web::Data<Metrics>) -> impl Responder {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&metrics.registry().gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

/// Degraded once no graph connection is free: new order calls would queue
/// on the pool until they time out.
async fn health(metrics: web::Data<Metrics>) -> impl Responder {
    let available = metrics.pool_available.get();
    let status = if available > 0 { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(serde_json::json!({
        "status": status,
        "service": "soiree-orders",
        "graphPool": { "availableConnections": available },
        "ordersCreated": metrics.orders_created.get(),
    }))
}
