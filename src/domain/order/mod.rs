// ============================================================================
// Order Domain - the order aggregate and its workflow
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (Order, Participant, LineItem, StepOrder, Stage, drafts)
// - Errors (OrderError enum)
// - Schema (labels, relationship types, property keys)
// - Queries (statement builders for create, search, fetch, mutations)
// - Assembler (result rows → Order aggregate)
// - Workflow (step transition engine and per-stage hooks)
// - Service (the public facade)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod schema;
pub mod queries;
pub mod assembler;
pub mod workflow;
pub mod service;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
pub use assembler::assemble;
pub use workflow::{next_stage, FollowUp, NoopHook, StageHook, StageHooks, StepEngine, TransitionPlan};
pub use service::OrderService;
