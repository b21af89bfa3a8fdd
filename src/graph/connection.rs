use async_trait::async_trait;
use std::time::Duration;

use super::statement::Statement;
use super::value::Row;

// ============================================================================
// Store Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Timed out after {0:?} waiting for a graph connection")]
    PoolTimeout(Duration),

    #[error("Graph connection pool is closed")]
    PoolClosed,

    #[error("Missing statement parameter: {0}")]
    MissingParameter(String),

    #[error("Unbound pattern variable: {0}")]
    UnboundVariable(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Statement matched no rows: {0}")]
    NoRowsMatched(String),

    #[error("Graph connection failed: {0}")]
    Connection(String),
}

impl StoreError {
    /// The connection that produced this error should not be reused.
    pub fn is_broken_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

// ============================================================================
// Connection Seams
// ============================================================================

/// A live session against the graph store.
#[async_trait]
pub trait GraphConnection: Send {
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Row>, StoreError>;

    /// Executes every statement or none of them.
    async fn run_batch(&mut self, statements: &[Statement]) -> Result<Vec<Vec<Row>>, StoreError>;
}

/// Opens new connections for the pool.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn GraphConnection>, StoreError>;
}
