use crate::graph::Value;

// Labels
pub const ORDER: &str = "Order";
pub const STEP: &str = "StepOrder";
pub const SOIREE: &str = "Soiree";
pub const USER: &str = "User";
pub const ITEM: &str = "Item";

// Relationship types
pub const SOIREE_LINK: &str = "SOIREE";
pub const PARTICIPATE_LINK: &str = "PARTICIPATE";
pub const CONTAINS_LINK: &str = "CONTAINS";
pub const STEP_LINK: &str = "HAS_STEP";

// Order properties
pub const TOTAL_PRICE: &str = "totalPrice";
pub const DONE_STATE: &str = "doneState";
pub const VERSION: &str = "version";

// Participant link properties
pub const SHARE_OF_PRICE: &str = "shareOfPrice";
pub const PAYMENT_REFERENCE: &str = "paymentReference";
pub const APPROVAL_STATE: &str = "approvalState";

// Line item link properties
pub const QUANTITY: &str = "quantity";

// Step properties
pub const STEP_NAME: &str = "name";
pub const OPENED_AT: &str = "openedAt";
pub const RESULT: &str = "result";

/// Flags are stored as `"true"` / `"false"`; unset means the property is absent.
pub fn flag(value: bool) -> Value {
    Value::Str(if value { "true" } else { "false" }.to_string())
}
