//! Order subsystem for the soiree backend: group orders tied to one event,
//! their participants and line items, and the step workflow that carries an
//! order from `Issued` to `Completed`.

pub mod config;
pub mod domain;
pub mod graph;
pub mod metrics;

pub use config::{ConfigError, PoolConfig, ServiceConfig};
pub use domain::order::{OrderError, OrderService};
