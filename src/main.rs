use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use soiree_orders::domain::order::{
    LineItem, Order, OrderDraft, OrderFilter, OrderService, ParticipantDraft, Stage, StageHooks, StepEngine,
};
use soiree_orders::graph::{GraphPool, MemoryGraph, Properties, Value};
use soiree_orders::metrics::{self, Metrics};
use soiree_orders::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;

    // Structured logging; RUST_LOG overrides the configured filter
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
        )
        .init();

    tracing::info!("🚀 Starting soiree order service demo");

    // === 1. Metrics registry and HTTP endpoint ===
    let metrics = Arc::new(Metrics::new()?);
    let server_metrics = metrics.clone();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Metrics runtime error: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(server_metrics, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 2. Graph store and pool ===
    let graph = MemoryGraph::new();
    let pool = Arc::new(GraphPool::new(Arc::new(graph.clone()), &config.pool));
    tracing::info!(
        max_connections = config.pool.max_connections,
        acquire_timeout_ms = config.pool.acquire_timeout_ms,
        "Graph pool ready"
    );

    // === 3. Entities owned by other subsystems ===
    let soiree = graph.seed_node("Soiree", named("Rooftop launch")).await;
    let alice = graph.seed_node("User", named("alice")).await;
    let bruno = graph.seed_node("User", named("bruno")).await;
    let platter = graph.seed_node("Item", named("cheese platter")).await;
    let cava = graph.seed_node("Item", named("cava")).await;

    // Hook registry is checked against every stage before serving
    let engine = StepEngine::new(StageHooks::noop())?;
    let service = OrderService::new(pool, engine, metrics);

    // === 4. Walk one order through the whole workflow ===
    let order = service
        .create_order(OrderDraft {
            soiree_id: soiree,
            total_price: 1000,
            participants: vec![
                ParticipantDraft { user_id: alice, share_of_price: 500, payment_reference: "pay-alice".into() },
                ParticipantDraft { user_id: bruno, share_of_price: 500, payment_reference: "pay-bruno".into() },
            ],
            line_items: vec![
                LineItem { item_id: platter, quantity: 1 },
                LineItem { item_id: cava, quantity: 2 },
            ],
        })
        .await?;
    log_order("created", &order);

    let order = service.answer_order(order.id, alice, true).await?;
    log_order("alice answered", &order);

    let mut order = order;
    for stage in Stage::ALL {
        order = service.put_order(order.id, stage.as_str(), true).await?;
        log_order(stage.as_str(), &order);
    }

    let done = service.search_orders(OrderFilter::default()).await?;
    tracing::info!(orders = done.len(), "🔎 Orders in store");

    tracing::info!("🎉 Demo complete!");
    Ok(())
}

fn named(name: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert("name".to_string(), Value::from(name));
    properties
}

fn log_order(label: &str, order: &Order) {
    match serde_json::to_string(order) {
        Ok(json) => tracing::info!(order_id = order.id, "📦 {}: {}", label, json),
        Err(e) => tracing::warn!(order_id = order.id, error = %e, "Failed to serialize order"),
    }
}
