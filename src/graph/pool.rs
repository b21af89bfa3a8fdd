use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use super::connection::{GraphConnection, GraphStore, StoreError};
use super::statement::Statement;
use super::value::Row;

// ============================================================================
// Bounded Connection Pool
// ============================================================================
//
// At most `max_connections` handles are checked out at once. Acquisition
// waits up to `acquire_timeout` for a free slot. Dropping the handle returns
// the connection to the idle list and frees the slot, so every exit path of
// a caller releases what it acquired.
//
// ============================================================================

type IdleList = Arc<Mutex<Vec<Box<dyn GraphConnection>>>>;

pub struct GraphPool {
    store: Arc<dyn GraphStore>,
    permits: Arc<Semaphore>,
    idle: IdleList,
    acquire_timeout: Duration,
}

impl GraphPool {
    pub fn new(store: Arc<dyn GraphStore>, config: &PoolConfig) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            idle: Arc::new(Mutex::new(Vec::new())),
            acquire_timeout: config.acquire_timeout(),
        }
    }

    pub async fn acquire(&self) -> Result<PooledConnection, StoreError> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    timeout_ms = self.acquire_timeout.as_millis() as u64,
                    "Graph pool exhausted"
                );
                StoreError::PoolTimeout(self.acquire_timeout)
            })?
            .map_err(|_| StoreError::PoolClosed)?;

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let conn = match reused {
            Some(conn) => conn,
            None => {
                tracing::debug!("Opening new graph connection");
                self.store.connect().await?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            idle: self.idle.clone(),
            broken: false,
            _permit: permit,
        })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn idle_connections(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

pub struct PooledConnection {
    conn: Option<Box<dyn GraphConnection>>,
    idle: IdleList,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub async fn run(&mut self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::PoolClosed)?;
        let result = conn.run(statement).await;
        self.note(&result);
        result
    }

    pub async fn run_batch(&mut self, statements: &[Statement]) -> Result<Vec<Vec<Row>>, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::PoolClosed)?;
        let result = conn.run_batch(statements).await;
        self.note(&result);
        result
    }

    fn note<T>(&mut self, result: &Result<T, StoreError>) {
        if let Err(err) = result {
            if err.is_broken_connection() {
                self.broken = true;
            }
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.broken {
            tracing::warn!("Discarding broken graph connection");
            return;
        }
        if let Some(conn) = self.conn.take() {
            if let Ok(mut idle) = self.idle.lock() {
                idle.push(conn);
            }
        }
    }
}
