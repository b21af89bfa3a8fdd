use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::graph::{Node, Properties, Relationship, Row, Value};
use super::errors::OrderError;
use super::schema;
use super::value_objects::{LineItem, Order, Participant, Stage, StepOrder};

// ============================================================================
// Order Aggregate Assembler
// ============================================================================
//
// Rows from `fetch_order` are a cross product of the optional joins, so the
// same node or relationship shows up in many rows. Assembly is two passes:
//
// 1. Bucket every node and relationship by identity.
// 2. Walk the distinct relationships in creation order and fold each target
//    node into the aggregate once.
//
// ============================================================================

#[derive(Default)]
struct Elements {
    nodes: HashMap<i64, Node>,
    relationships: BTreeMap<i64, Relationship>,
}

impl Elements {
    fn collect(rows: &[Row]) -> Self {
        let mut elements = Self::default();
        for value in rows.iter().flat_map(Row::values) {
            match value {
                Value::Node(node) => {
                    elements.nodes.entry(node.id).or_insert_with(|| node.clone());
                }
                Value::Relationship(rel) => {
                    elements.relationships.entry(rel.id).or_insert_with(|| rel.clone());
                }
                _ => {}
            }
        }
        elements
    }

    fn target(&self, id: i64, label: &str) -> Result<&Node, OrderError> {
        self.nodes
            .get(&id)
            .filter(|node| node.has_label(label))
            .ok_or_else(|| OrderError::Malformed(format!("{} node {} missing from result", label, id)))
    }
}

fn required<'a>(properties: &'a Properties, key: &str, owner: &str) -> Result<&'a Value, OrderError> {
    match properties.get(key) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(OrderError::Malformed(format!("{} is missing {}", owner, key))),
    }
}

fn int_prop(properties: &Properties, key: &str, owner: &str) -> Result<i64, OrderError> {
    required(properties, key, owner)?
        .as_int()
        .ok_or_else(|| OrderError::Malformed(format!("{}.{} is not an integer", owner, key)))
}

fn str_prop<'a>(properties: &'a Properties, key: &str, owner: &str) -> Result<&'a str, OrderError> {
    required(properties, key, owner)?
        .as_str()
        .ok_or_else(|| OrderError::Malformed(format!("{}.{} is not a string", owner, key)))
}

/// Absent means unset; anything other than `"true"` / `"false"` is malformed.
fn flag_prop(properties: &Properties, key: &str, owner: &str) -> Result<Option<bool>, OrderError> {
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(s)) if s == "true" => Ok(Some(true)),
        Some(Value::Str(s)) if s == "false" => Ok(Some(false)),
        Some(other) => Err(OrderError::Malformed(format!("{}.{} has invalid flag {:?}", owner, key, other))),
    }
}

fn step_from(node: &Node) -> Result<StepOrder, OrderError> {
    let name = str_prop(&node.properties, schema::STEP_NAME, "step")?;
    let stage = Stage::from_stored(name)
        .ok_or_else(|| OrderError::Malformed(format!("unknown stored stage {:?}", name)))?;
    let opened_at = str_prop(&node.properties, schema::OPENED_AT, "step")?;
    let opened_at = DateTime::parse_from_rfc3339(opened_at)
        .map_err(|e| OrderError::Malformed(format!("step.openedAt: {}", e)))?
        .with_timezone(&Utc);

    Ok(StepOrder {
        id: node.id,
        name: stage,
        opened_at,
        result: flag_prop(&node.properties, schema::RESULT, "step")?,
    })
}

/// Builds the aggregate for `order_id` from raw fetch rows.
pub fn assemble(order_id: i64, rows: &[Row]) -> Result<Order, OrderError> {
    let elements = Elements::collect(rows);

    let order_node = elements
        .nodes
        .get(&order_id)
        .filter(|node| node.has_label(schema::ORDER))
        .ok_or(OrderError::OrderNotFound(order_id))?;

    let mut soiree_id = None;
    let mut participants = Vec::new();
    let mut line_items = Vec::new();
    let mut steps = Vec::new();
    let mut folded: HashSet<(&str, i64)> = HashSet::new();

    for rel in elements.relationships.values() {
        match rel.rel_type.as_str() {
            schema::SOIREE_LINK if rel.start == order_id => {
                if !folded.insert((schema::SOIREE_LINK, rel.end)) {
                    continue;
                }
                let soiree = elements.target(rel.end, schema::SOIREE)?;
                if soiree_id.replace(soiree.id).is_some() {
                    return Err(OrderError::Malformed(format!("order {} links more than one soiree", order_id)));
                }
            }
            schema::PARTICIPATE_LINK if rel.end == order_id => {
                if !folded.insert((schema::PARTICIPATE_LINK, rel.start)) {
                    continue;
                }
                let user = elements.target(rel.start, schema::USER)?;
                participants.push(Participant {
                    user_id: user.id,
                    share_of_price: int_prop(&rel.properties, schema::SHARE_OF_PRICE, "participant link")?,
                    payment_reference: str_prop(&rel.properties, schema::PAYMENT_REFERENCE, "participant link")?
                        .to_string(),
                    approval_state: flag_prop(&rel.properties, schema::APPROVAL_STATE, "participant link")?,
                });
            }
            schema::CONTAINS_LINK if rel.start == order_id => {
                if !folded.insert((schema::CONTAINS_LINK, rel.end)) {
                    continue;
                }
                let item = elements.target(rel.end, schema::ITEM)?;
                line_items.push(LineItem {
                    item_id: item.id,
                    quantity: int_prop(&rel.properties, schema::QUANTITY, "line item link")?,
                });
            }
            schema::STEP_LINK if rel.start == order_id => {
                if !folded.insert((schema::STEP_LINK, rel.end)) {
                    continue;
                }
                steps.push(step_from(elements.target(rel.end, schema::STEP)?)?);
            }
            _ => {}
        }
    }

    // creation order; step nodes are never deleted, so their ids only grow
    steps.sort_by_key(|step| step.id);

    let soiree_id = soiree_id
        .ok_or_else(|| OrderError::Malformed(format!("order {} has no soiree link", order_id)))?;

    Ok(Order {
        id: order_id,
        total_price: int_prop(&order_node.properties, schema::TOTAL_PRICE, "order")?,
        done_state: flag_prop(&order_node.properties, schema::DONE_STATE, "order")?,
        soiree_id,
        participants,
        line_items,
        steps,
        version: int_prop(&order_node.properties, schema::VERSION, "order")?,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
