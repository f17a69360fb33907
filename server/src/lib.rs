//! # Command Delivery Server
//!
//! Turns paid store orders into commands executed on remote game servers over
//! the RCON protocol, and keeps undeliverable orders queued until their
//! recipient is back online.
//!
//! ## Core Responsibilities
//!
//! ### Delivery
//! For one order the orchestrator renders the product's command script, picks
//! candidate servers in priority order and runs the whole script on one
//! candidate at a time until a candidate accepts every command. Each attempt
//! opens a fresh connection, authenticates, sends one command and closes.
//!
//! ### Queueing
//! When every candidate fails and the recipient is offline, the order gets a
//! single queue entry with a bounded attempt count. A later join by that
//! player retries it; a background sweeper can also retry players who stayed
//! online.
//!
//! ### Audit
//! Every command attempt lands in an append-only log table, and the final
//! attempt list is snapshotted on the order itself.
//!
//! ## Module Organization
//!
//! - `store`: SQLite persistence (orders, catalog, logs, queue, presence)
//! - `transport`: RCON client behind the `CommandTransport` trait
//! - `selector`: candidate server ordering
//! - `delivery`: the order state machine
//! - `queue`: retry bookkeeping
//! - `presence`: join/leave handling and queue draining
//! - `sweeper`: optional periodic retry
//! - `catalog`: JSON seeding of products, servers and commands
//! - `api`: HTTP endpoints for operators and the game-side listener
//!
//! ## Concurrency
//!
//! Orders are independent and may be delivered concurrently; the database is
//! the only shared state. Order claims and queue updates are single
//! conditional statements, so racing triggers for the same order cannot both
//! deliver it.

pub mod api;
pub mod catalog;
pub mod config;
pub mod delivery;
pub mod error;
pub mod presence;
pub mod queue;
pub mod selector;
pub mod store;
pub mod sweeper;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DeliveryConfig, SecretStore};
pub use delivery::{DeliveryOrchestrator, RetryOutcome};
pub use error::{DeliveryError, TransportError};
pub use presence::PresenceTracker;
pub use queue::QueueManager;
pub use transport::{CommandTransport, RconClient};
