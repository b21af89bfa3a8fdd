use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;

use crate::graph::{Expr, NodePattern, Pattern, Predicate, ReturnItem, Statement, Value};
use super::errors::OrderError;
use super::schema::{self, flag};
use super::value_objects::{FlagFilter, LineItem, OrderDraft, OrderFilter, ParticipantDraft, ParticipantFilter, Stage, StepFilter};

// ============================================================================
// Order Statements - pure builders, no store access
// ============================================================================
//
// Statements whose clause count depends on caller-supplied lists are built
// from one fragment per list position. Each fragment names its pattern
// variables and parameters after its position (`u0`, `user_0`, `u1`, ...),
// so no two clauses ever share a variable.
//
// ============================================================================

fn id_is(var: &str, param: &str) -> Predicate {
    Predicate::IdEquals { var: var.to_string(), param: param.to_string() }
}

fn prop_is(var: &str, key: &str, param: &str) -> Predicate {
    Predicate::PropEquals { var: var.to_string(), key: key.to_string(), param: param.to_string() }
}

fn prop(key: &str, param: &str) -> (String, Expr) {
    (key.to_string(), Expr::param(param))
}

fn match_order(order_id: i64) -> Statement {
    Statement::new()
        .matching(Pattern::node("o", schema::ORDER), vec![id_is("o", "order_id")])
        .bind("order_id", order_id)
}

pub fn timestamp(at: DateTime<Utc>) -> Value {
    Value::Str(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Checks a draft before anything touches the store. The price-sum
/// invariant is checked first.
pub fn validate_draft(draft: &OrderDraft) -> Result<(), OrderError> {
    let shares = draft.share_total().ok_or(OrderError::ShareOverflow)?;
    if shares != draft.total_price {
        return Err(OrderError::PriceMismatch { total: draft.total_price, shares });
    }

    let mut users = HashSet::new();
    for participant in &draft.participants {
        if participant.share_of_price < 0 {
            return Err(OrderError::NegativeShare(participant.share_of_price));
        }
        if !users.insert(participant.user_id) {
            return Err(OrderError::DuplicateParticipant(participant.user_id));
        }
    }

    let mut items = HashSet::new();
    for item in &draft.line_items {
        if item.quantity <= 0 {
            return Err(OrderError::InvalidQuantity(item.quantity));
        }
        if !items.insert(item.item_id) {
            return Err(OrderError::DuplicateLineItem(item.item_id));
        }
    }

    Ok(())
}

// ============================================================================
// Create
// ============================================================================

fn participant_match(index: usize, participant: &ParticipantDraft) -> Statement {
    let var = format!("u{index}");
    let param = format!("user_{index}");
    Statement::new()
        .matching(Pattern::node(var.as_str(), schema::USER), vec![id_is(&var, &param)])
        .bind(param, participant.user_id)
}

fn participant_link(index: usize, participant: &ParticipantDraft) -> Statement {
    let share = format!("share_{index}");
    let payment = format!("payment_{index}");
    Statement::new()
        .create_rel(
            &format!("u{index}"),
            Some(format!("p{index}").as_str()),
            schema::PARTICIPATE_LINK,
            "o",
            vec![prop(schema::SHARE_OF_PRICE, &share), prop(schema::PAYMENT_REFERENCE, &payment)],
        )
        .bind(share, participant.share_of_price)
        .bind(payment, participant.payment_reference.as_str())
}

fn item_match(index: usize, item: &LineItem) -> Statement {
    let var = format!("i{index}");
    let param = format!("item_{index}");
    Statement::new()
        .matching(Pattern::node(var.as_str(), schema::ITEM), vec![id_is(&var, &param)])
        .bind(param, item.item_id)
}

fn item_link(index: usize, item: &LineItem) -> Statement {
    let quantity = format!("quantity_{index}");
    Statement::new()
        .create_rel(
            "o",
            Some(format!("c{index}").as_str()),
            schema::CONTAINS_LINK,
            &format!("i{index}"),
            vec![prop(schema::QUANTITY, &quantity)],
        )
        .bind(quantity, item.quantity)
}

/// One statement creating the order, its participant and item links, the
/// soiree link and the opening `Issued` step. Returns `id(o) AS id`; an
/// empty result means one of the referenced nodes does not exist.
pub fn create_order(draft: &OrderDraft, opened_at: DateTime<Utc>) -> Result<Statement, OrderError> {
    validate_draft(draft)?;

    let mut statement = Statement::new()
        .matching(Pattern::node("e", schema::SOIREE), vec![id_is("e", "soiree_id")])
        .bind("soiree_id", draft.soiree_id);

    for (index, participant) in draft.participants.iter().enumerate() {
        statement = statement.extend(participant_match(index, participant));
    }
    for (index, item) in draft.line_items.iter().enumerate() {
        statement = statement.extend(item_match(index, item));
    }

    statement = statement
        .create_node(
            "o",
            schema::ORDER,
            vec![
                prop(schema::TOTAL_PRICE, "total_price"),
                (schema::VERSION.to_string(), Expr::Literal(Value::Int(0))),
            ],
        )
        .create_node(
            "s",
            schema::STEP,
            vec![prop(schema::STEP_NAME, "stage"), prop(schema::OPENED_AT, "opened_at")],
        )
        .create_rel("o", None, schema::SOIREE_LINK, "e", vec![])
        .bind("total_price", draft.total_price)
        .bind("stage", Stage::Issued.as_str())
        .bind("opened_at", timestamp(opened_at));

    for (index, participant) in draft.participants.iter().enumerate() {
        statement = statement.extend(participant_link(index, participant));
    }
    for (index, item) in draft.line_items.iter().enumerate() {
        statement = statement.extend(item_link(index, item));
    }

    Ok(statement
        .create_rel("o", None, schema::STEP_LINK, "s", vec![])
        .returning(vec![ReturnItem::Id { var: "o".into(), alias: "id".into() }], false))
}

// ============================================================================
// Search
// ============================================================================

/// Pushes the predicate for one tri-state flag; only `Equals` binds `param`.
fn flag_constraint(
    statement: Statement,
    predicates: &mut Vec<Predicate>,
    var: &str,
    key: &str,
    param: String,
    filter: FlagFilter,
) -> Statement {
    match filter {
        FlagFilter::Equals(value) => {
            predicates.push(prop_is(var, key, &param));
            statement.bind(param, flag(value))
        }
        FlagFilter::Set => {
            predicates.push(Predicate::PropIsSet { var: var.to_string(), key: key.to_string() });
            statement
        }
        FlagFilter::Unset => {
            predicates.push(Predicate::PropIsUnset { var: var.to_string(), key: key.to_string() });
            statement
        }
    }
}

fn participant_filter(index: usize, filter: &ParticipantFilter) -> Statement {
    let user = format!("u{index}");
    let link = format!("p{index}");
    let user_param = format!("user_{index}");

    let mut predicates = vec![id_is(&user, &user_param)];
    let mut statement = Statement::new().bind(user_param, filter.user_id);
    if let Some(approval) = filter.approval_state {
        let param = format!("approval_{index}");
        statement = flag_constraint(statement, &mut predicates, &link, schema::APPROVAL_STATE, param, approval);
    }

    statement.matching(
        Pattern::path(
            NodePattern::labelled(user.as_str(), schema::USER),
            Some(link.as_str()),
            schema::PARTICIPATE_LINK,
            NodePattern::bound("o"),
        ),
        predicates,
    )
}

fn step_filter(index: usize, filter: &StepFilter) -> Statement {
    let step = format!("s{index}");
    let name_param = format!("step_{index}");

    let mut predicates = vec![prop_is(&step, schema::STEP_NAME, &name_param)];
    let mut statement = Statement::new().bind(name_param, filter.name.as_str());
    if let Some(result) = filter.result {
        let param = format!("result_{index}");
        statement = flag_constraint(statement, &mut predicates, &step, schema::RESULT, param, result);
    }

    statement.matching(
        Pattern::path(
            NodePattern::bound("o"),
            None,
            schema::STEP_LINK,
            NodePattern::labelled(step.as_str(), schema::STEP),
        ),
        predicates,
    )
}

/// Matches orders satisfying every populated filter field and returns
/// their identities only.
pub fn search_orders(filter: &OrderFilter) -> Statement {
    let mut predicates = Vec::new();
    let mut statement = Statement::new();
    if let Some(done_state) = filter.done_state {
        statement = flag_constraint(statement, &mut predicates, "o", schema::DONE_STATE, "done_state".into(), done_state);
    }
    statement = statement.matching(Pattern::node("o", schema::ORDER), predicates);

    if let Some(soiree_id) = filter.soiree_id {
        statement = statement
            .matching(
                Pattern::path(
                    NodePattern::bound("o"),
                    None,
                    schema::SOIREE_LINK,
                    NodePattern::labelled("e", schema::SOIREE),
                ),
                vec![id_is("e", "soiree_id")],
            )
            .bind("soiree_id", soiree_id);
    }

    for (index, participant) in filter.participants.iter().enumerate() {
        statement = statement.extend(participant_filter(index, participant));
    }
    for (index, step) in filter.steps.iter().enumerate() {
        statement = statement.extend(step_filter(index, step));
    }

    statement.returning(vec![ReturnItem::Id { var: "o".into(), alias: "id".into() }], true)
}

// ============================================================================
// Fetch and narrow mutations
// ============================================================================

/// The order with every relationship the aggregate is built from. The
/// optional joins fan out, so rows repeat nodes and relationships.
pub fn fetch_order(order_id: i64) -> Statement {
    let from_order = |rel: &str, rel_type: &str, target: &str, label: &str| {
        Pattern::path(NodePattern::bound("o"), Some(rel), rel_type, NodePattern::labelled(target, label))
    };

    match_order(order_id)
        .optional_matching(from_order("e", schema::SOIREE_LINK, "s", schema::SOIREE), vec![])
        .optional_matching(
            Pattern::path(
                NodePattern::labelled("u", schema::USER),
                Some("p"),
                schema::PARTICIPATE_LINK,
                NodePattern::bound("o"),
            ),
            vec![],
        )
        .optional_matching(from_order("c", schema::CONTAINS_LINK, "i", schema::ITEM), vec![])
        .optional_matching(from_order("h", schema::STEP_LINK, "st", schema::STEP), vec![])
        .returning(
            ["o", "e", "s", "p", "u", "c", "i", "h", "st"]
                .into_iter()
                .map(|var| ReturnItem::Var(var.to_string()))
                .collect(),
            false,
        )
}

pub fn answer_participant(order_id: i64, user_id: i64, approved: bool) -> Statement {
    Statement::new()
        .matching(
            Pattern::path(
                NodePattern::labelled("u", schema::USER),
                Some("p"),
                schema::PARTICIPATE_LINK,
                NodePattern::labelled("o", schema::ORDER),
            ),
            vec![id_is("o", "order_id"), id_is("u", "user_id")],
        )
        .set("p", schema::APPROVAL_STATE, Expr::param("approval"))
        .returning(vec![ReturnItem::Id { var: "p".into(), alias: "id".into() }], false)
        .bind("order_id", order_id)
        .bind("user_id", user_id)
        .bind("approval", flag(approved))
}

/// Leads every step-machine batch: matches only at the version read during
/// precondition checks, and bumps it.
pub fn version_guard(order_id: i64, expected_version: i64) -> Statement {
    Statement::new()
        .matching(
            Pattern::node("o", schema::ORDER),
            vec![id_is("o", "order_id"), prop_is("o", schema::VERSION, "expected_version")],
        )
        .set("o", schema::VERSION, Expr::param("next_version"))
        .bind("order_id", order_id)
        .bind("expected_version", expected_version)
        .bind("next_version", expected_version + 1)
        .require_rows()
}

pub fn close_step(order_id: i64, step_id: i64, result: bool) -> Statement {
    Statement::new()
        .matching(
            Pattern::path(
                NodePattern::labelled("o", schema::ORDER),
                None,
                schema::STEP_LINK,
                NodePattern::labelled("s", schema::STEP),
            ),
            vec![id_is("o", "order_id"), id_is("s", "step_id")],
        )
        .set("s", schema::RESULT, Expr::param("result"))
        .bind("order_id", order_id)
        .bind("step_id", step_id)
        .bind("result", flag(result))
        .require_rows()
}

pub fn open_step(order_id: i64, stage: Stage, opened_at: DateTime<Utc>) -> Statement {
    match_order(order_id)
        .create_node(
            "s",
            schema::STEP,
            vec![prop(schema::STEP_NAME, "stage"), prop(schema::OPENED_AT, "opened_at")],
        )
        .create_rel("o", None, schema::STEP_LINK, "s", vec![])
        .bind("stage", stage.as_str())
        .bind("opened_at", timestamp(opened_at))
        .require_rows()
}

pub fn mark_done(order_id: i64, done: bool) -> Statement {
    match_order(order_id)
        .set("o", schema::DONE_STATE, Expr::param("done_state"))
        .bind("done_state", flag(done))
        .require_rows()
}
