use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::connection::{GraphConnection, GraphStore, StoreError};
use super::statement::{Clause, Expr, NodePattern, Pattern, Predicate, ReturnItem, Statement};
use super::value::{Node, Properties, Relationship, Row, Value};

// ============================================================================
// In-Memory Property Graph
// ============================================================================
//
// Evaluates the clause model against an in-process graph. Each statement or
// batch runs on a working copy that replaces the shared graph only when every
// statement succeeded, which gives batches their all-or-nothing behaviour.
//
// ============================================================================

#[derive(Debug, Clone, Default)]
struct GraphData {
    next_id: i64,
    nodes: BTreeMap<i64, Node>,
    relationships: BTreeMap<i64, Relationship>,
}

impl GraphData {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryGraph {
    data: Arc<RwLock<GraphData>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node directly, bypassing statements. Used to stand up the
    /// entities other subsystems own (soirees, users, items).
    pub async fn seed_node(&self, label: &str, properties: Properties) -> i64 {
        let mut data = self.data.write().await;
        let id = data.allocate_id();
        data.nodes.insert(
            id,
            Node {
                id,
                labels: vec![label.to_string()],
                properties,
            },
        );
        id
    }

    pub async fn count_label(&self, label: &str) -> usize {
        let data = self.data.read().await;
        data.nodes.values().filter(|n| n.has_label(label)).count()
    }

    pub async fn count_relationships(&self, rel_type: &str) -> usize {
        let data = self.data.read().await;
        data.relationships.values().filter(|r| r.rel_type == rel_type).count()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn connect(&self) -> Result<Box<dyn GraphConnection>, StoreError> {
        Ok(Box::new(MemoryConnection { data: self.data.clone() }))
    }
}

pub struct MemoryConnection {
    data: Arc<RwLock<GraphData>>,
}

#[async_trait]
impl GraphConnection for MemoryConnection {
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let mut shared = self.data.write().await;
        let mut working = shared.clone();
        let rows = evaluate(&mut working, statement)?;
        *shared = working;
        Ok(rows)
    }

    async fn run_batch(&mut self, statements: &[Statement]) -> Result<Vec<Vec<Row>>, StoreError> {
        let mut shared = self.data.write().await;
        let mut working = shared.clone();
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(evaluate(&mut working, statement)?);
        }
        *shared = working;
        Ok(results)
    }
}

// ============================================================================
// Evaluation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound {
    Node(i64),
    Rel(i64),
    Null,
}

type Binding = HashMap<String, Bound>;

fn evaluate(data: &mut GraphData, statement: &Statement) -> Result<Vec<Row>, StoreError> {
    let params = &statement.params;
    let mut bindings: Vec<Binding> = vec![Binding::new()];
    let mut projection: Option<(&[ReturnItem], bool)> = None;

    for clause in &statement.clauses {
        match clause {
            Clause::Match { pattern, predicates, optional } => {
                let mut next = Vec::new();
                for binding in &bindings {
                    let extended = extend_match(data, binding, pattern, predicates, params)?;
                    if extended.is_empty() && *optional {
                        let mut nulled = binding.clone();
                        for var in pattern_vars(pattern) {
                            nulled.entry(var.to_string()).or_insert(Bound::Null);
                        }
                        next.push(nulled);
                    } else {
                        next.extend(extended);
                    }
                }
                bindings = next;
            }
            Clause::CreateNode { var, label, properties } => {
                for binding in bindings.iter_mut() {
                    if binding.contains_key(var) {
                        return Err(StoreError::InvalidStatement(format!("variable `{}` already bound", var)));
                    }
                    let props = resolve_properties(properties, params)?;
                    let id = data.allocate_id();
                    data.nodes.insert(id, Node { id, labels: vec![label.clone()], properties: props });
                    binding.insert(var.clone(), Bound::Node(id));
                }
            }
            Clause::CreateRel { from, var, rel_type, to, properties } => {
                for binding in bindings.iter_mut() {
                    let start = bound_node(binding, from)?;
                    let end = bound_node(binding, to)?;
                    let props = resolve_properties(properties, params)?;
                    let id = data.allocate_id();
                    data.relationships.insert(
                        id,
                        Relationship { id, rel_type: rel_type.clone(), start, end, properties: props },
                    );
                    if let Some(var) = var {
                        binding.insert(var.clone(), Bound::Rel(id));
                    }
                }
            }
            Clause::Set { var, key, value } => {
                let value = resolve(value, params)?;
                for binding in &bindings {
                    let properties = match binding.get(var) {
                        Some(Bound::Node(id)) => data.nodes.get_mut(id).map(|n| &mut n.properties),
                        Some(Bound::Rel(id)) => data.relationships.get_mut(id).map(|r| &mut r.properties),
                        Some(Bound::Null) => None,
                        None => return Err(StoreError::UnboundVariable(var.clone())),
                    };
                    if let Some(properties) = properties {
                        if value.is_null() {
                            properties.remove(key);
                        } else {
                            properties.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            Clause::Return { items, distinct } => {
                projection = Some((items.as_slice(), *distinct));
            }
        }
    }

    if statement.require_rows && bindings.is_empty() {
        return Err(StoreError::NoRowsMatched(first_line(statement)));
    }

    let Some((items, distinct)) = projection else {
        return Ok(Vec::new());
    };

    let mut rows: Vec<Row> = Vec::with_capacity(bindings.len());
    for binding in &bindings {
        let row = project(data, binding, items)?;
        if distinct && rows.contains(&row) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

fn first_line(statement: &Statement) -> String {
    statement
        .to_string()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

fn pattern_vars(pattern: &Pattern) -> Vec<&str> {
    match pattern {
        Pattern::Node(node) => vec![node.var.as_str()],
        Pattern::Path { from, rel, to } => {
            let mut vars = vec![from.var.as_str(), to.var.as_str()];
            if let Some(var) = &rel.var {
                vars.push(var.as_str());
            }
            vars
        }
    }
}

fn bound_node(binding: &Binding, var: &str) -> Result<i64, StoreError> {
    match binding.get(var) {
        Some(Bound::Node(id)) => Ok(*id),
        Some(_) => Err(StoreError::InvalidStatement(format!("`{}` is not a node", var))),
        None => Err(StoreError::UnboundVariable(var.to_string())),
    }
}

fn resolve(expr: &Expr, params: &BTreeMap<String, Value>) -> Result<Value, StoreError> {
    match expr {
        Expr::Param(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::MissingParameter(name.clone())),
        Expr::Literal(value) => Ok(value.clone()),
    }
}

fn resolve_properties(
    properties: &[(String, Expr)],
    params: &BTreeMap<String, Value>,
) -> Result<Properties, StoreError> {
    let mut resolved = Properties::new();
    for (key, expr) in properties {
        let value = resolve(expr, params)?;
        if !value.is_null() {
            resolved.insert(key.clone(), value);
        }
    }
    Ok(resolved)
}

/// Node candidates for a pattern position, honouring an existing binding.
fn node_fits(data: &GraphData, binding: &Binding, pattern: &NodePattern, id: i64) -> bool {
    if let Some(bound) = binding.get(&pattern.var) {
        return *bound == Bound::Node(id);
    }
    match (&pattern.label, data.nodes.get(&id)) {
        (Some(label), Some(node)) => node.has_label(label),
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

fn extend_match(
    data: &GraphData,
    binding: &Binding,
    pattern: &Pattern,
    predicates: &[Predicate],
    params: &BTreeMap<String, Value>,
) -> Result<Vec<Binding>, StoreError> {
    let mut candidates = Vec::new();

    match pattern {
        Pattern::Node(node) => {
            for id in data.nodes.keys() {
                if node_fits(data, binding, node, *id) {
                    let mut extended = binding.clone();
                    extended.insert(node.var.clone(), Bound::Node(*id));
                    candidates.push(extended);
                }
            }
        }
        Pattern::Path { from, rel, to } => {
            for relationship in data.relationships.values() {
                if relationship.rel_type != rel.rel_type {
                    continue;
                }
                if let Some(var) = &rel.var {
                    match binding.get(var) {
                        Some(Bound::Rel(id)) if *id == relationship.id => {}
                        Some(_) => continue,
                        None => {}
                    }
                }
                if !node_fits(data, binding, from, relationship.start)
                    || !node_fits(data, binding, to, relationship.end)
                {
                    continue;
                }
                let mut extended = binding.clone();
                extended.insert(from.var.clone(), Bound::Node(relationship.start));
                extended.insert(to.var.clone(), Bound::Node(relationship.end));
                if let Some(var) = &rel.var {
                    extended.insert(var.clone(), Bound::Rel(relationship.id));
                }
                candidates.push(extended);
            }
        }
    }

    let mut matched = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if all_hold(data, &candidate, predicates, params)? {
            matched.push(candidate);
        }
    }
    Ok(matched)
}

fn element_properties<'a>(data: &'a GraphData, bound: Bound) -> Option<&'a Properties> {
    match bound {
        Bound::Node(id) => data.nodes.get(&id).map(|n| &n.properties),
        Bound::Rel(id) => data.relationships.get(&id).map(|r| &r.properties),
        Bound::Null => None,
    }
}

fn all_hold(
    data: &GraphData,
    binding: &Binding,
    predicates: &[Predicate],
    params: &BTreeMap<String, Value>,
) -> Result<bool, StoreError> {
    for predicate in predicates {
        let var = match predicate {
            Predicate::IdEquals { var, .. }
            | Predicate::PropEquals { var, .. }
            | Predicate::PropIsSet { var, .. }
            | Predicate::PropIsUnset { var, .. } => var,
        };
        let bound = *binding
            .get(var)
            .ok_or_else(|| StoreError::UnboundVariable(var.clone()))?;

        let holds = match predicate {
            Predicate::IdEquals { param, .. } => {
                let wanted = resolve(&Expr::Param(param.clone()), params)?;
                match bound {
                    Bound::Node(id) | Bound::Rel(id) => wanted.as_int() == Some(id),
                    Bound::Null => false,
                }
            }
            Predicate::PropEquals { key, param, .. } => {
                let wanted = resolve(&Expr::Param(param.clone()), params)?;
                element_properties(data, bound)
                    .and_then(|props| props.get(key))
                    .is_some_and(|actual| *actual == wanted)
            }
            Predicate::PropIsSet { key, .. } => element_properties(data, bound)
                .is_some_and(|props| props.get(key).is_some_and(|v| !v.is_null())),
            Predicate::PropIsUnset { key, .. } => element_properties(data, bound)
                .is_some_and(|props| props.get(key).map_or(true, Value::is_null)),
        };

        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn project(data: &GraphData, binding: &Binding, items: &[ReturnItem]) -> Result<Row, StoreError> {
    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        let (name, var) = match item {
            ReturnItem::Var(var) => (var.clone(), var),
            ReturnItem::Id { var, alias } => (alias.clone(), var),
        };
        let bound = *binding
            .get(var)
            .ok_or_else(|| StoreError::UnboundVariable(var.clone()))?;

        let value = match (item, bound) {
            (_, Bound::Null) => Value::Null,
            (ReturnItem::Id { .. }, Bound::Node(id) | Bound::Rel(id)) => Value::Int(id),
            (ReturnItem::Var(_), Bound::Node(id)) => data
                .nodes
                .get(&id)
                .cloned()
                .map(Value::Node)
                .unwrap_or(Value::Null),
            (ReturnItem::Var(_), Bound::Rel(id)) => data
                .relationships
                .get(&id)
                .cloned()
                .map(Value::Relationship)
                .unwrap_or(Value::Null),
        };
        columns.push((name, value));
    }
    Ok(Row::new(columns))
}
