// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Only the order subsystem lives here. Soirees, users and items belong to
// other subsystems; orders refer to them by node identity alone.
//
// ============================================================================

pub mod order;
