//! # Delivery Operator Client
//!
//! Thin HTTP client for the delivery server. Operators use it to trigger or
//! retry a delivery, replay presence events by hand, and inspect or
//! force-resolve the retry queue.
//!
//! All requests go through [`DeliveryClient`], which attaches the admin bearer
//! token or the listener token depending on the endpoint group.

pub mod api;

pub use api::{ClientError, DeliveryClient};
