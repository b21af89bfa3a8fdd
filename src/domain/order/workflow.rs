use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::Statement;
use super::errors::OrderError;
use super::queries;
use super::value_objects::{Order, Stage};

// ============================================================================
// Step Transition Engine
// ============================================================================
//
// Workflow: Issued → Confirmed → Verified → Ready → Deliverpaid → Completed
//
// A transition closes one open step. On success the next unopened stage is
// opened, or the order is marked done when the sequence is exhausted. On
// failure the order is marked failed. Planning is pure: it returns the batch
// the facade submits atomically.
//
// ============================================================================

/// Per-stage business rule seam. Hooks see the current aggregate and may
/// contribute extra statements to the transition batch.
pub trait StageHook: Send + Sync {
    fn statements(&self, order: &Order, outcome: bool) -> Result<Vec<Statement>, OrderError>;
}

/// Contributes nothing.
pub struct NoopHook;

impl StageHook for NoopHook {
    fn statements(&self, _order: &Order, _outcome: bool) -> Result<Vec<Statement>, OrderError> {
        Ok(Vec::new())
    }
}

#[derive(Clone)]
pub struct StageHooks {
    hooks: HashMap<Stage, Arc<dyn StageHook>>,
}

impl StageHooks {
    /// Every stage mapped to a no-op hook.
    pub fn noop() -> Self {
        let hook: Arc<dyn StageHook> = Arc::new(NoopHook);
        Self {
            hooks: Stage::ALL.iter().map(|stage| (*stage, hook.clone())).collect(),
        }
    }

    pub fn empty() -> Self {
        Self { hooks: HashMap::new() }
    }

    pub fn with(mut self, stage: Stage, hook: Arc<dyn StageHook>) -> Self {
        self.hooks.insert(stage, hook);
        self
    }

    /// Fails on the first stage without a hook. Run at startup.
    pub fn validate(&self) -> Result<(), OrderError> {
        match Stage::ALL.iter().find(|stage| !self.hooks.contains_key(*stage)) {
            Some(stage) => Err(OrderError::MissingHook(*stage)),
            None => Ok(()),
        }
    }

    fn get(&self, stage: Stage) -> Result<&Arc<dyn StageHook>, OrderError> {
        self.hooks.get(&stage).ok_or(OrderError::MissingHook(stage))
    }
}

impl Default for StageHooks {
    fn default() -> Self {
        Self::noop()
    }
}

/// What happens after the requested step closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Open(Stage),
    Complete,
    Fail,
    /// An earlier stage is unclosed or failed; nothing else changes.
    Wait,
}

/// Walks the workflow from the start with `closing` recorded as passed and
/// finds the first stage whose predecessor passed and which is not open yet.
pub fn next_stage(order: &Order, closing: Stage) -> FollowUp {
    for stage in Stage::ALL {
        let result = if stage == closing {
            Some(Some(true))
        } else {
            order.step(stage).map(|step| step.result)
        };
        match result {
            None => return FollowUp::Open(stage),
            Some(Some(true)) => continue,
            Some(_) => return FollowUp::Wait,
        }
    }
    FollowUp::Complete
}

#[derive(Debug)]
pub struct TransitionPlan {
    pub stage: Stage,
    pub follow_up: FollowUp,
    pub statements: Vec<Statement>,
}

#[derive(Clone, Default)]
pub struct StepEngine {
    hooks: StageHooks,
}

impl StepEngine {
    pub fn new(hooks: StageHooks) -> Result<Self, OrderError> {
        hooks.validate()?;
        Ok(Self { hooks })
    }

    /// Checks preconditions against `order` (a fresh read) and returns the
    /// batch that records the transition.
    pub fn plan(
        &self,
        order: &Order,
        stage_name: &str,
        outcome: bool,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, OrderError> {
        let stage = Stage::parse_normalized(stage_name)
            .ok_or_else(|| OrderError::UnknownStage(stage_name.to_string()))?;
        let hook = self.hooks.get(stage)?;

        if order.is_done() {
            return Err(OrderError::AlreadyDone);
        }
        let step = order.step(stage).ok_or(OrderError::StepNotOpen(stage))?;
        if step.is_closed() {
            return Err(OrderError::StepClosed(stage));
        }

        let mut statements = vec![queries::version_guard(order.id, order.version)];
        statements.extend(hook.statements(order, outcome)?);
        statements.push(queries::close_step(order.id, step.id, outcome));

        let follow_up = if outcome { next_stage(order, stage) } else { FollowUp::Fail };
        match follow_up {
            FollowUp::Open(next) => statements.push(queries::open_step(order.id, next, now)),
            FollowUp::Complete => statements.push(queries::mark_done(order.id, true)),
            FollowUp::Fail => statements.push(queries::mark_done(order.id, false)),
            FollowUp::Wait => {}
        }

        Ok(TransitionPlan { stage, follow_up, statements })
    }

    /// Administrative override: closes every pending step as failed and marks
    /// the order failed, regardless of which stage is open. A completed order
    /// has every step passed and stays completed.
    pub fn plan_fail(&self, order: &Order) -> Result<Vec<Statement>, OrderError> {
        if order.done_state == Some(true) {
            return Err(OrderError::AlreadyDone);
        }

        let mut statements = vec![queries::version_guard(order.id, order.version)];
        statements.extend(order.pending_steps().map(|step| queries::close_step(order.id, step.id, false)));
        statements.push(queries::mark_done(order.id, false));
        Ok(statements)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
