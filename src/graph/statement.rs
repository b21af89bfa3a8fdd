use std::collections::BTreeMap;
use std::fmt;

use super::value::Value;

// ============================================================================
// Statement Model - parameterized graph-pattern statements
// ============================================================================
//
// A statement is an ordered list of clauses plus a named-parameter map.
// Clauses render to Cypher so the same value can be logged, sent to a
// driver-backed adapter, or evaluated by the in-memory engine.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub var: String,
    pub label: Option<String>,
}

impl NodePattern {
    pub fn labelled(var: impl Into<String>, label: &str) -> Self {
        Self { var: var.into(), label: Some(label.to_string()) }
    }

    /// Refers to a node already bound by an earlier clause.
    pub fn bound(var: impl Into<String>) -> Self {
        Self { var: var.into(), label: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub var: Option<String>,
    pub rel_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Node(NodePattern),
    Path {
        from: NodePattern,
        rel: RelPattern,
        to: NodePattern,
    },
}

impl Pattern {
    pub fn node(var: impl Into<String>, label: &str) -> Self {
        Pattern::Node(NodePattern::labelled(var, label))
    }

    pub fn path(from: NodePattern, rel_var: Option<&str>, rel_type: &str, to: NodePattern) -> Self {
        Pattern::Path {
            from,
            rel: RelPattern {
                var: rel_var.map(str::to_string),
                rel_type: rel_type.to_string(),
            },
            to,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Param(String),
    Literal(Value),
}

impl Expr {
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Param(name.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    IdEquals { var: String, param: String },
    PropEquals { var: String, key: String, param: String },
    PropIsSet { var: String, key: String },
    PropIsUnset { var: String, key: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnItem {
    Var(String),
    Id { var: String, alias: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match {
        pattern: Pattern,
        predicates: Vec<Predicate>,
        optional: bool,
    },
    CreateNode {
        var: String,
        label: String,
        properties: Vec<(String, Expr)>,
    },
    CreateRel {
        from: String,
        var: Option<String>,
        rel_type: String,
        to: String,
        properties: Vec<(String, Expr)>,
    },
    Set {
        var: String,
        key: String,
        value: Expr,
    },
    Return {
        items: Vec<ReturnItem>,
        distinct: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub clauses: Vec<Clause>,
    pub params: BTreeMap<String, Value>,
    /// Reject the statement (and any batch carrying it) when matching binds no rows.
    pub require_rows: bool,
}

impl Statement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(mut self, pattern: Pattern, predicates: Vec<Predicate>) -> Self {
        self.clauses.push(Clause::Match { pattern, predicates, optional: false });
        self
    }

    pub fn optional_matching(mut self, pattern: Pattern, predicates: Vec<Predicate>) -> Self {
        self.clauses.push(Clause::Match { pattern, predicates, optional: true });
        self
    }

    pub fn create_node(mut self, var: &str, label: &str, properties: Vec<(String, Expr)>) -> Self {
        self.clauses.push(Clause::CreateNode {
            var: var.to_string(),
            label: label.to_string(),
            properties,
        });
        self
    }

    pub fn create_rel(
        mut self,
        from: &str,
        var: Option<&str>,
        rel_type: &str,
        to: &str,
        properties: Vec<(String, Expr)>,
    ) -> Self {
        self.clauses.push(Clause::CreateRel {
            from: from.to_string(),
            var: var.map(str::to_string),
            rel_type: rel_type.to_string(),
            to: to.to_string(),
            properties,
        });
        self
    }

    pub fn set(mut self, var: &str, key: &str, value: Expr) -> Self {
        self.clauses.push(Clause::Set {
            var: var.to_string(),
            key: key.to_string(),
            value,
        });
        self
    }

    pub fn returning(mut self, items: Vec<ReturnItem>, distinct: bool) -> Self {
        self.clauses.push(Clause::Return { items, distinct });
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn require_rows(mut self) -> Self {
        self.require_rows = true;
        self
    }

    /// Appends another statement's clauses and parameters.
    pub fn extend(mut self, other: Statement) -> Self {
        self.clauses.extend(other.clauses);
        self.params.extend(other.params);
        self.require_rows |= other.require_rows;
        self
    }
}

// ============================================================================
// Cypher Rendering
// ============================================================================

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "({}:{})", self.var, label),
            None => write!(f, "({})", self.var),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Node(node) => write!(f, "{}", node),
            Pattern::Path { from, rel, to } => {
                let var = rel.var.as_deref().unwrap_or("");
                write!(f, "{}-[{}:{}]->{}", from, var, rel.rel_type, to)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(name) => write!(f, "${}", name),
            Expr::Literal(Value::Str(s)) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Expr::Literal(Value::Int(v)) => write!(f, "{}", v),
            Expr::Literal(Value::Bool(v)) => write!(f, "{}", v),
            Expr::Literal(_) => write!(f, "null"),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::IdEquals { var, param } => write!(f, "id({}) = ${}", var, param),
            Predicate::PropEquals { var, key, param } => write!(f, "{}.{} = ${}", var, key, param),
            Predicate::PropIsSet { var, key } => write!(f, "{}.{} IS NOT NULL", var, key),
            Predicate::PropIsUnset { var, key } => write!(f, "{}.{} IS NULL", var, key),
        }
    }
}

fn write_properties(f: &mut fmt::Formatter<'_>, properties: &[(String, Expr)]) -> fmt::Result {
    if properties.is_empty() {
        return Ok(());
    }
    write!(f, " {{")?;
    for (i, (key, expr)) in properties.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}: {}", key, expr)?;
    }
    write!(f, "}}")
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Match { pattern, predicates, optional } => {
                if *optional {
                    write!(f, "OPTIONAL ")?;
                }
                write!(f, "MATCH {}", pattern)?;
                for (i, predicate) in predicates.iter().enumerate() {
                    let joiner = if i == 0 { " WHERE " } else { " AND " };
                    write!(f, "{}{}", joiner, predicate)?;
                }
                Ok(())
            }
            Clause::CreateNode { var, label, properties } => {
                write!(f, "CREATE ({}:{}", var, label)?;
                write_properties(f, properties)?;
                write!(f, ")")
            }
            Clause::CreateRel { from, var, rel_type, to, properties } => {
                write!(f, "CREATE ({})-[{}:{}", from, var.as_deref().unwrap_or(""), rel_type)?;
                write_properties(f, properties)?;
                write!(f, "]->({})", to)
            }
            Clause::Set { var, key, value } => write!(f, "SET {}.{} = {}", var, key, value),
            Clause::Return { items, distinct } => {
                write!(f, "RETURN ")?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        ReturnItem::Var(var) => write!(f, "{}", var)?,
                        ReturnItem::Id { var, alias } => write!(f, "id({}) AS {}", var, alias)?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}
