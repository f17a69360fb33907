//! SQLite persistence for the delivery engine.
//!
//! Catalog tables (products, orders, commands, servers, assignments) are owned
//! by external tooling; the engine reads them and writes only order status,
//! delivery logs, queue entries, and presence.

mod db;
mod models;
mod queries;
mod queries_catalog;
mod queries_presence;
mod queries_queue;

pub use db::{unix_timestamp, Database, DatabaseError};
pub use models::*;
pub use queries_catalog::{NewCommand, NewOrder, NewServer};
pub use queries_queue::RetryPolicy;

#[cfg(test)]
pub(crate) mod fixtures;
