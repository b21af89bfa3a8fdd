use std::sync::Arc;

use chrono::Utc;
use soiree_orders::domain::order::{
    queries, schema, ErrorKind, FlagFilter, LineItem, OrderDraft, OrderError, OrderFilter, OrderService,
    ParticipantDraft, ParticipantFilter, Stage, StageHooks, StepEngine, StepFilter,
};
use soiree_orders::graph::{GraphPool, MemoryGraph, Properties, StoreError, Value};
use soiree_orders::metrics::Metrics;
use soiree_orders::PoolConfig;

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    graph: MemoryGraph,
    pool: Arc<GraphPool>,
    service: OrderService,
    soiree: i64,
    alice: i64,
    bruno: i64,
    platter: i64,
    cava: i64,
}

fn named(name: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert("name".to_string(), Value::from(name));
    properties
}

async fn fixture_with(config: PoolConfig) -> Fixture {
    let graph = MemoryGraph::new();
    let soiree = graph.seed_node("Soiree", named("launch")).await;
    let alice = graph.seed_node("User", named("alice")).await;
    let bruno = graph.seed_node("User", named("bruno")).await;
    let platter = graph.seed_node("Item", named("platter")).await;
    let cava = graph.seed_node("Item", named("cava")).await;

    let pool = Arc::new(GraphPool::new(Arc::new(graph.clone()), &config));
    let engine = StepEngine::new(StageHooks::noop()).unwrap();
    let metrics = Arc::new(Metrics::new().unwrap());
    let service = OrderService::new(pool.clone(), engine, metrics);

    Fixture { graph, pool, service, soiree, alice, bruno, platter, cava }
}

async fn fixture() -> Fixture {
    fixture_with(PoolConfig::default()).await
}

impl Fixture {
    fn draft(&self) -> OrderDraft {
        OrderDraft {
            soiree_id: self.soiree,
            total_price: 1000,
            participants: vec![
                ParticipantDraft { user_id: self.alice, share_of_price: 500, payment_reference: "A".into() },
                ParticipantDraft { user_id: self.bruno, share_of_price: 500, payment_reference: "B".into() },
            ],
            line_items: vec![
                LineItem { item_id: self.platter, quantity: 1 },
                LineItem { item_id: self.cava, quantity: 2 },
            ],
        }
    }
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_returns_issued_order() {
    let fx = fixture().await;

    let order = fx.service.create_order(fx.draft()).await.unwrap();

    assert_eq!(order.total_price, 1000);
    assert_eq!(order.soiree_id, fx.soiree);
    assert_eq!(order.done_state, None);
    assert_eq!(order.participants.len(), 2);
    assert_eq!(order.line_items.len(), 2);
    assert_eq!(order.steps.len(), 1);
    assert_eq!(order.steps[0].name, Stage::Issued);
    assert_eq!(order.steps[0].result, None);

    let alice = order.participant(fx.alice).unwrap();
    assert_eq!(alice.share_of_price, 500);
    assert_eq!(alice.payment_reference, "A");
    assert_eq!(alice.approval_state, None);

    let cava = order.line_items.iter().find(|item| item.item_id == fx.cava).unwrap();
    assert_eq!(cava.quantity, 2);
}

#[tokio::test]
async fn test_price_mismatch_writes_nothing() {
    let fx = fixture().await;
    let mut draft = fx.draft();
    draft.participants[1].share_of_price = 400;

    let err = fx.service.create_order(draft).await.unwrap_err();

    assert!(matches!(err, OrderError::PriceMismatch { total: 1000, shares: 900 }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fx.graph.count_label(schema::ORDER).await, 0);
    assert_eq!(fx.graph.count_label(schema::STEP).await, 0);
}

#[tokio::test]
async fn test_unknown_reference_creates_nothing() {
    let fx = fixture().await;
    let mut draft = fx.draft();
    draft.line_items[1].item_id = 9_999;

    let err = fx.service.create_order(draft).await.unwrap_err();

    assert!(matches!(err, OrderError::ReferenceNotFound));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.graph.count_label(schema::ORDER).await, 0);
    assert_eq!(fx.graph.count_relationships(schema::PARTICIPATE_LINK).await, 0);
}

#[tokio::test]
async fn test_order_without_line_items_round_trips() {
    let fx = fixture().await;
    let mut draft = fx.draft();
    draft.line_items.clear();

    let created = fx.service.create_order(draft).await.unwrap();
    let fetched = fx.service.get_order(created.id).await.unwrap();

    assert!(fetched.line_items.is_empty());
    assert_eq!(fetched.participants.len(), 2);
    assert_eq!(fetched.steps.len(), 1);
    assert_eq!(fetched, created);
    assert_eq!(fx.graph.count_relationships(schema::CONTAINS_LINK).await, 0);
}

#[tokio::test]
async fn test_oversized_shares_rejected_before_store() {
    let fx = fixture().await;
    let mut draft = fx.draft();
    draft.total_price = 0;
    draft.participants[0].share_of_price = i64::MAX;
    draft.participants[1].share_of_price = i64::MAX;

    let err = fx.service.create_order(draft).await.unwrap_err();

    assert!(matches!(err, OrderError::ShareOverflow));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fx.graph.count_label(schema::ORDER).await, 0);
}

#[tokio::test]
async fn test_get_unknown_order_is_not_found() {
    let fx = fixture().await;

    let err = fx.service.get_order(424_242).await.unwrap_err();

    assert!(matches!(err, OrderError::OrderNotFound(424_242)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Transitions
// ============================================================================

#[tokio::test]
async fn test_full_workflow_completes_order() {
    let fx = fixture().await;
    let mut order = fx.service.create_order(fx.draft()).await.unwrap();

    for stage in Stage::ALL {
        order = fx.service.put_order(order.id, stage.as_str(), true).await.unwrap();
    }

    assert_eq!(order.done_state, Some(true));
    assert_eq!(order.steps.len(), Stage::ALL.len());
    assert!(order.steps.iter().all(|step| step.result == Some(true)));
    let names: Vec<Stage> = order.steps.iter().map(|step| step.name).collect();
    assert_eq!(names, Stage::ALL.to_vec());
}

#[tokio::test]
async fn test_put_opens_successor_step() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();

    let order = fx.service.put_order(order.id, "issued", true).await.unwrap();

    assert_eq!(order.step(Stage::Issued).unwrap().result, Some(true));
    let confirmed = order.step(Stage::Confirmed).unwrap();
    assert_eq!(confirmed.result, None);
    assert!(confirmed.opened_at >= order.step(Stage::Issued).unwrap().opened_at);
    assert_eq!(order.done_state, None);
}

#[tokio::test]
async fn test_failed_step_marks_order_failed() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();
    fx.service.put_order(order.id, "Issued", true).await.unwrap();

    let order = fx.service.put_order(order.id, "Confirmed", false).await.unwrap();

    assert_eq!(order.done_state, Some(false));
    assert_eq!(order.step(Stage::Confirmed).unwrap().result, Some(false));
    assert!(order.step(Stage::Verified).is_none());
}

#[tokio::test]
async fn test_done_order_rejects_transitions() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();
    fx.service.put_order(order.id, "Issued", false).await.unwrap();

    let err = fx.service.put_order(order.id, "Issued", true).await.unwrap_err();

    assert!(matches!(err, OrderError::AlreadyDone));
    assert_eq!(err.to_string(), "order already done");
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_unopened_step_rejected() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();

    let err = fx.service.put_order(order.id, "Verified", true).await.unwrap_err();

    assert!(matches!(err, OrderError::StepNotOpen(Stage::Verified)));
    assert_eq!(err.to_string(), "target step has yet to open");

    // nothing moved
    let order = fx.service.get_order(order.id).await.unwrap();
    assert_eq!(order.steps.len(), 1);
    assert_eq!(order.version, 0);
}

#[tokio::test]
async fn test_closed_step_rejected() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();
    fx.service.put_order(order.id, "Issued", true).await.unwrap();

    let err = fx.service.put_order(order.id, "Issued", true).await.unwrap_err();

    assert!(matches!(err, OrderError::StepClosed(Stage::Issued)));
    assert_eq!(err.to_string(), "target step is closed already");

    // still exactly one step per stage
    let order = fx.service.get_order(order.id).await.unwrap();
    assert_eq!(order.steps.iter().filter(|s| s.name == Stage::Issued).count(), 1);
    assert_eq!(order.steps.iter().filter(|s| s.name == Stage::Confirmed).count(), 1);
}

#[tokio::test]
async fn test_unknown_stage_name_rejected() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();

    let err = fx.service.put_order(order.id, "Shipped", true).await.unwrap_err();

    assert!(matches!(err, OrderError::UnknownStage(_)));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_put_on_unknown_order_is_not_found() {
    let fx = fixture().await;

    let err = fx.service.put_order(77_777, "Issued", true).await.unwrap_err();

    assert!(matches!(err, OrderError::OrderNotFound(77_777)));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_stale_version_guard_aborts_batch() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();
    let issued = order.step(Stage::Issued).unwrap().id;

    // another writer moves the order on first
    let mut conn = fx.pool.acquire().await.unwrap();
    conn.run(&queries::version_guard(order.id, order.version)).await.unwrap();

    let stale = vec![
        queries::version_guard(order.id, order.version),
        queries::close_step(order.id, issued, true),
        queries::open_step(order.id, Stage::Confirmed, Utc::now()),
    ];
    let err = conn.run_batch(&stale).await.unwrap_err();
    drop(conn);

    assert!(matches!(err, StoreError::NoRowsMatched(_)));
    let order = fx.service.get_order(order.id).await.unwrap();
    assert_eq!(order.version, 1);
    assert_eq!(order.steps.len(), 1);
    assert_eq!(order.step(Stage::Issued).unwrap().result, None);
}

#[tokio::test]
async fn test_concurrent_transitions_apply_once() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();

    let (first, second) = tokio::join!(
        fx.service.put_order(order.id, "Issued", true),
        fx.service.put_order(order.id, "Issued", true),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let rejected = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(rejected, OrderError::Conflict(_) | OrderError::StepClosed(Stage::Issued)));

    let order = fx.service.get_order(order.id).await.unwrap();
    assert_eq!(order.steps.len(), 2);
    assert_eq!(order.version, 1);
}

#[tokio::test]
async fn test_exhausted_pool_times_out() {
    let fx = fixture_with(PoolConfig { max_connections: 1, acquire_timeout_ms: 50 }).await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();

    let held = fx.pool.acquire().await.unwrap();
    let err = fx.service.get_order(order.id).await.unwrap_err();

    assert!(matches!(err, OrderError::Store(StoreError::PoolTimeout(_))));
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.public_message(), "internal error");

    drop(held);
    assert!(fx.service.get_order(order.id).await.is_ok());
}

// ============================================================================
// Answer / Fail
// ============================================================================

#[tokio::test]
async fn test_answer_records_approval_only() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();

    let order = fx.service.answer_order(order.id, fx.bruno, false).await.unwrap();

    assert_eq!(order.participant(fx.bruno).unwrap().approval_state, Some(false));
    assert_eq!(order.participant(fx.alice).unwrap().approval_state, None);
    assert_eq!(order.done_state, None);
    assert_eq!(order.steps.len(), 1);
    assert_eq!(order.steps[0].result, None);
}

#[tokio::test]
async fn test_answer_for_non_participant() {
    let fx = fixture().await;
    let mut draft = fx.draft();
    draft.participants.truncate(1);
    draft.participants[0].share_of_price = 1000;
    let order = fx.service.create_order(draft).await.unwrap();

    let err = fx.service.answer_order(order.id, fx.bruno, true).await.unwrap_err();
    assert!(matches!(err, OrderError::ParticipantNotFound { user_id, .. } if user_id == fx.bruno));

    let err = fx.service.answer_order(55_555, fx.alice, true).await.unwrap_err();
    assert!(matches!(err, OrderError::OrderNotFound(55_555)));
}

#[tokio::test]
async fn test_fail_closes_pending_steps() {
    let fx = fixture().await;
    let order = fx.service.create_order(fx.draft()).await.unwrap();
    fx.service.put_order(order.id, "Issued", true).await.unwrap();

    let order = fx.service.fail_order(order.id).await.unwrap();

    assert_eq!(order.done_state, Some(false));
    assert_eq!(order.step(Stage::Issued).unwrap().result, Some(true));
    assert_eq!(order.step(Stage::Confirmed).unwrap().result, Some(false));
    assert_eq!(order.pending_steps().count(), 0);

    let err = fx.service.put_order(order.id, "Confirmed", true).await.unwrap_err();
    assert!(matches!(err, OrderError::AlreadyDone));
}

#[tokio::test]
async fn test_fail_leaves_completed_order_alone() {
    let fx = fixture().await;
    let mut order = fx.service.create_order(fx.draft()).await.unwrap();
    for stage in Stage::ALL {
        order = fx.service.put_order(order.id, stage.as_str(), true).await.unwrap();
    }

    let err = fx.service.fail_order(order.id).await.unwrap_err();

    assert!(matches!(err, OrderError::AlreadyDone));
    let after = fx.service.get_order(order.id).await.unwrap();
    assert_eq!(after.done_state, Some(true));
    assert_eq!(after.version, order.version);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_by_done_state_modes() {
    let fx = fixture().await;
    let open = fx.service.create_order(fx.draft()).await.unwrap();
    let failed = fx.service.create_order(fx.draft()).await.unwrap();
    fx.service.fail_order(failed.id).await.unwrap();

    let by_mode = |mode| OrderFilter { done_state: Some(mode), ..OrderFilter::default() };

    let unset = fx.service.search_orders(by_mode(FlagFilter::Unset)).await.unwrap();
    assert_eq!(unset.iter().map(|o| o.id).collect::<Vec<_>>(), vec![open.id]);

    let set = fx.service.search_orders(by_mode(FlagFilter::Set)).await.unwrap();
    assert_eq!(set.iter().map(|o| o.id).collect::<Vec<_>>(), vec![failed.id]);

    let equals = fx.service.search_orders(by_mode(FlagFilter::Equals(true))).await.unwrap();
    assert!(equals.is_empty());

    let all = fx.service.search_orders(OrderFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_search_by_participant_and_step() {
    let fx = fixture().await;
    let first = fx.service.create_order(fx.draft()).await.unwrap();
    let second = fx.service.create_order(fx.draft()).await.unwrap();
    fx.service.answer_order(first.id, fx.alice, true).await.unwrap();
    fx.service.put_order(second.id, "Issued", true).await.unwrap();

    let approved = OrderFilter {
        participants: vec![ParticipantFilter { user_id: fx.alice, approval_state: Some(FlagFilter::Equals(true)) }],
        ..OrderFilter::default()
    };
    let found = fx.service.search_orders(approved).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, first.id);

    let confirmed_open = OrderFilter {
        soiree_id: Some(fx.soiree),
        steps: vec![StepFilter { name: Stage::Confirmed, result: None }],
        ..OrderFilter::default()
    };
    let found = fx.service.search_orders(confirmed_open).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, second.id);
    // full aggregate, not just the matched fragment
    assert_eq!(found[0].participants.len(), 2);
    assert_eq!(found[0].steps.len(), 2);
}

#[tokio::test]
async fn test_search_by_pending_approval_and_closed_step() {
    let fx = fixture().await;
    let answered = fx.service.create_order(fx.draft()).await.unwrap();
    let pending = fx.service.create_order(fx.draft()).await.unwrap();
    fx.service.answer_order(answered.id, fx.bruno, false).await.unwrap();
    fx.service.put_order(answered.id, "Issued", true).await.unwrap();

    let awaiting_bruno = OrderFilter {
        participants: vec![ParticipantFilter { user_id: fx.bruno, approval_state: Some(FlagFilter::Unset) }],
        ..OrderFilter::default()
    };
    let found = fx.service.search_orders(awaiting_bruno).await.unwrap();
    assert_eq!(found.iter().map(|o| o.id).collect::<Vec<_>>(), vec![pending.id]);

    let issued_closed = OrderFilter {
        steps: vec![StepFilter { name: Stage::Issued, result: Some(FlagFilter::Set) }],
        ..OrderFilter::default()
    };
    let found = fx.service.search_orders(issued_closed).await.unwrap();
    assert_eq!(found.iter().map(|o| o.id).collect::<Vec<_>>(), vec![answered.id]);
}
