use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::graph::{GraphPool, PooledConnection, Statement, StoreError, Value};
use crate::metrics::Metrics;

use super::assembler;
use super::errors::{ErrorKind, OrderError};
use super::queries;
use super::value_objects::{Order, OrderDraft, OrderFilter};
use super::workflow::StepEngine;

// ============================================================================
// Order Service
// ============================================================================
//
// Orchestrates: validate → build statements → store → re-read aggregate
//
// Each operation holds one pooled connection for its whole duration and
// always returns a fresh read of the aggregate, never one pieced together
// from what it just wrote.
//
// ============================================================================

pub struct OrderService {
    pool: Arc<GraphPool>,
    engine: StepEngine,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(pool: Arc<GraphPool>, engine: StepEngine, metrics: Arc<Metrics>) -> Self {
        Self { pool, engine, metrics }
    }

    pub async fn create_order(&self, draft: OrderDraft) -> Result<Order, OrderError> {
        self.instrumented("create_order", async {
            let statement = queries::create_order(&draft, Utc::now())?;

            let mut conn = self.connection().await?;
            tracing::debug!(statement = %statement, "Creating order");
            let rows = conn.run(&statement).await?;

            let order_id = rows
                .first()
                .and_then(|row| row.get("id"))
                .and_then(Value::as_int)
                .ok_or(OrderError::ReferenceNotFound)?;

            self.metrics.orders_created.inc();
            tracing::info!(
                order_id,
                soiree_id = draft.soiree_id,
                participants = draft.participants.len(),
                items = draft.line_items.len(),
                "✅ Order created"
            );

            load(&mut conn, order_id).await
        })
        .await
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Order, OrderError> {
        self.instrumented("get_order", async {
            let mut conn = self.connection().await?;
            load(&mut conn, order_id).await
        })
        .await
    }

    /// Matching identities first, then one full fetch per identity.
    pub async fn search_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, OrderError> {
        self.instrumented("search_orders", async {
            let statement = queries::search_orders(&filter);

            let mut conn = self.connection().await?;
            tracing::debug!(statement = %statement, "Searching orders");
            let rows = conn.run(&statement).await?;

            let mut ids: Vec<i64> = rows
                .iter()
                .map(|row| row.get("id").and_then(Value::as_int))
                .collect::<Option<Vec<i64>>>()
                .ok_or_else(|| OrderError::Malformed("search returned a non-integer id".into()))?;
            ids.sort_unstable();

            let mut orders = Vec::with_capacity(ids.len());
            for order_id in ids {
                orders.push(load(&mut conn, order_id).await?);
            }

            tracing::debug!(matched = orders.len(), "Search complete");
            Ok(orders)
        })
        .await
    }

    /// Closes `stage_name` with `outcome` and advances the workflow.
    pub async fn put_order(&self, order_id: i64, stage_name: &str, outcome: bool) -> Result<Order, OrderError> {
        self.instrumented("put_order", async {
            let mut conn = self.connection().await?;
            let current = load(&mut conn, order_id).await?;

            let plan = self.engine.plan(&current, stage_name, outcome, Utc::now())?;
            submit(&mut conn, order_id, &plan.statements).await?;

            self.metrics.record_transition(plan.stage.as_str(), outcome);
            tracing::info!(
                order_id,
                stage = %plan.stage,
                outcome,
                follow_up = ?plan.follow_up,
                "✅ Step transition recorded"
            );

            load(&mut conn, order_id).await
        })
        .await
    }

    /// Records one participant's approval. Steps and done state are untouched.
    pub async fn answer_order(&self, order_id: i64, user_id: i64, approved: bool) -> Result<Order, OrderError> {
        self.instrumented("answer_order", async {
            let statement = queries::answer_participant(order_id, user_id, approved);

            let mut conn = self.connection().await?;
            tracing::debug!(statement = %statement, "Answering order");
            let rows = conn.run(&statement).await?;

            if rows.is_empty() {
                // distinguishes a missing order from a missing participant
                load(&mut conn, order_id).await?;
                return Err(OrderError::ParticipantNotFound { order_id, user_id });
            }

            tracing::info!(order_id, user_id, approved, "✅ Participant answered");
            load(&mut conn, order_id).await
        })
        .await
    }

    /// Forces the order into the failed state, whatever stage is open.
    pub async fn fail_order(&self, order_id: i64) -> Result<Order, OrderError> {
        self.instrumented("fail_order", async {
            let mut conn = self.connection().await?;
            let current = load(&mut conn, order_id).await?;

            let statements = self.engine.plan_fail(&current)?;
            submit(&mut conn, order_id, &statements).await?;

            tracing::info!(
                order_id,
                closed_steps = current.pending_steps().count(),
                "✅ Order force-failed"
            );

            load(&mut conn, order_id).await
        })
        .await
    }

    async fn connection(&self) -> Result<PooledConnection, OrderError> {
        let conn = self.pool.acquire().await?;
        self.metrics.pool_available.set(self.pool.available() as i64);
        Ok(conn)
    }

    async fn instrumented<T, F>(&self, operation: &'static str, work: F) -> Result<T, OrderError>
    where
        F: Future<Output = Result<T, OrderError>>,
    {
        let span = tracing::info_span!("order", operation, correlation_id = %Uuid::now_v7());
        let started = Instant::now();

        let result = work.instrument(span.clone()).await;

        self.metrics.observe_duration(operation, started.elapsed().as_secs_f64());
        self.metrics.pool_available.set(self.pool.available() as i64);

        if let Err(err) = &result {
            self.metrics.record_failure(operation, err.label());
            let _entered = span.enter();
            match err.kind() {
                ErrorKind::Internal => tracing::error!(error = %err, "Order operation failed"),
                _ => tracing::warn!(error = %err, "Order operation rejected"),
            }
        }

        result
    }
}

async fn load(conn: &mut PooledConnection, order_id: i64) -> Result<Order, OrderError> {
    let rows = conn.run(&queries::fetch_order(order_id)).await?;
    assembler::assemble(order_id, &rows)
}

/// Runs a step-machine batch. An unmatched guard means another writer got
/// there first.
async fn submit(conn: &mut PooledConnection, order_id: i64, statements: &[Statement]) -> Result<(), OrderError> {
    for statement in statements {
        tracing::debug!(statement = %statement, "Batch statement");
    }

    conn.run_batch(statements).await.map_err(|err| match err {
        StoreError::NoRowsMatched(_) => OrderError::Conflict(order_id),
        other => other.into(),
    })?;

    Ok(())
}
