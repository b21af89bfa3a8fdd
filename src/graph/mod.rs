// ============================================================================
// Graph Store Adapter
// ============================================================================
//
// The order subsystem only needs four things from the graph store:
// bounded connection acquisition, single-statement execution, atomic batch
// execution, and release. The traits in `connection` are that seam; `memory`
// is the in-process implementation used by tests and the demo binary.
//
// ============================================================================

mod connection;
mod memory;
mod pool;
mod statement;
mod value;

pub use connection::{GraphConnection, GraphStore, StoreError};
pub use memory::{MemoryConnection, MemoryGraph};
pub use pool::{GraphPool, PooledConnection};
pub use statement::{Clause, Expr, NodePattern, Pattern, Predicate, RelPattern, ReturnItem, Statement};
pub use value::{Node, Properties, Relationship, Row, Value};
