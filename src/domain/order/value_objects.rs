use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Order Value Objects
// ============================================================================
//
// Tri-state flags (done state, step result, approval) are `Option<bool>`:
// `None` is unset, `Some(true)` / `Some(false)` the recorded outcome.
//
// ============================================================================

/// One stage of the fixed, linear order workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Issued,
    Confirmed,
    Verified,
    Ready,
    Deliverpaid,
    Completed,
}

impl Stage {
    /// Workflow order, first to last.
    pub const ALL: [Stage; 6] = [
        Stage::Issued,
        Stage::Confirmed,
        Stage::Verified,
        Stage::Ready,
        Stage::Deliverpaid,
        Stage::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Issued => "Issued",
            Stage::Confirmed => "Confirmed",
            Stage::Verified => "Verified",
            Stage::Ready => "Ready",
            Stage::Deliverpaid => "Deliverpaid",
            Stage::Completed => "Completed",
        }
    }

    /// Exact stored name, as written by this subsystem.
    pub fn from_stored(name: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|stage| stage.as_str() == name)
    }

    /// Case-normalizes a caller-supplied name (first letter upper, rest
    /// lower) before lookup, so `"deliverPaid"` and `"DELIVERPAID"` both
    /// resolve.
    pub fn parse_normalized(name: &str) -> Option<Stage> {
        let mut chars = name.trim().chars();
        let normalized: String = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect(),
            None => return None,
        };
        Stage::from_stored(&normalized)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: i64,
    pub share_of_price: i64,
    pub payment_reference: String,
    pub approval_state: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub item_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOrder {
    pub id: i64,
    pub name: Stage,
    pub opened_at: DateTime<Utc>,
    pub result: Option<bool>,
}

impl StepOrder {
    pub fn is_closed(&self) -> bool {
        self.result.is_some()
    }
}

/// The order aggregate as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub total_price: i64,
    pub done_state: Option<bool>,
    pub soiree_id: i64,
    pub participants: Vec<Participant>,
    pub line_items: Vec<LineItem>,
    pub steps: Vec<StepOrder>,
    /// Bumped by every step-machine write; guards concurrent transitions.
    pub version: i64,
}

impl Order {
    pub fn is_done(&self) -> bool {
        self.done_state.is_some()
    }

    pub fn step(&self, stage: Stage) -> Option<&StepOrder> {
        self.steps.iter().find(|step| step.name == stage)
    }

    pub fn participant(&self, user_id: i64) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn pending_steps(&self) -> impl Iterator<Item = &StepOrder> {
        self.steps.iter().filter(|step| !step.is_closed())
    }
}

// ============================================================================
// Drafts and Filters - caller input
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDraft {
    pub user_id: i64,
    pub share_of_price: i64,
    pub payment_reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub soiree_id: i64,
    pub total_price: i64,
    pub participants: Vec<ParticipantDraft>,
    pub line_items: Vec<LineItem>,
}

impl OrderDraft {
    /// `None` when the shares do not fit in an `i64`.
    pub fn share_total(&self) -> Option<i64> {
        self.participants
            .iter()
            .try_fold(0i64, |acc, p| acc.checked_add(p.share_of_price))
    }
}

/// Constraint on a tri-state flag (done state, approval, step result).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "value")]
pub enum FlagFilter {
    /// Exactly this recorded value
    Equals(bool),
    /// Any value recorded
    Set,
    /// Nothing recorded yet
    Unset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantFilter {
    pub user_id: i64,
    #[serde(default)]
    pub approval_state: Option<FlagFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFilter {
    pub name: Stage,
    #[serde(default)]
    pub result: Option<FlagFilter>,
}

/// Partial order used to search. Empty fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderFilter {
    pub done_state: Option<FlagFilter>,
    pub soiree_id: Option<i64>,
    pub participants: Vec<ParticipantFilter>,
    pub steps: Vec<StepFilter>,
}

// ============================================================================
// Unit Tests
// ============================================================================
