use crate::graph::StoreError;
use super::value_objects::Stage;

// ============================================================================
// Order Errors
// ============================================================================

/// How the transport layer should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("sum of participant shares ({shares}) does not match total price ({total})")]
    PriceMismatch { total: i64, shares: i64 },

    #[error("sum of participant shares overflows")]
    ShareOverflow,

    #[error("participant share cannot be negative: {0}")]
    NegativeShare(i64),

    #[error("invalid item quantity: {0}")]
    InvalidQuantity(i64),

    #[error("user {0} appears more than once in the order")]
    DuplicateParticipant(i64),

    #[error("item {0} appears more than once in the order")]
    DuplicateLineItem(i64),

    #[error("order already done")]
    AlreadyDone,

    #[error("target step has yet to open")]
    StepNotOpen(Stage),

    #[error("target step is closed already")]
    StepClosed(Stage),

    #[error("order not found: {0}")]
    OrderNotFound(i64),

    #[error("soiree, participant or item not found")]
    ReferenceNotFound,

    #[error("user {user_id} does not participate in order {order_id}")]
    ParticipantNotFound { order_id: i64, user_id: i64 },

    #[error("order {0} was modified concurrently")]
    Conflict(i64),

    #[error("unrecognized stage name: {0}")]
    UnknownStage(String),

    #[error("no hook registered for stage {0}")]
    MissingHook(Stage),

    #[error("malformed order data: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::PriceMismatch { .. }
            | OrderError::ShareOverflow
            | OrderError::NegativeShare(_)
            | OrderError::InvalidQuantity(_)
            | OrderError::DuplicateParticipant(_)
            | OrderError::DuplicateLineItem(_)
            | OrderError::AlreadyDone
            | OrderError::StepNotOpen(_)
            | OrderError::StepClosed(_) => ErrorKind::Validation,
            OrderError::OrderNotFound(_)
            | OrderError::ReferenceNotFound
            | OrderError::ParticipantNotFound { .. } => ErrorKind::NotFound,
            OrderError::Conflict(_) => ErrorKind::Conflict,
            OrderError::UnknownStage(_)
            | OrderError::MissingHook(_)
            | OrderError::Malformed(_)
            | OrderError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}
