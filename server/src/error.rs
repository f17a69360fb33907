//! Error types for the transport and delivery layers.

use shared::{DeliveryStatus, FrameError};
use std::time::Duration;
use thiserror::Error;

use crate::store::DatabaseError;

/// Failure of a single remote command attempt. Always local to one server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("RCON authentication failed")]
    Auth,

    #[error("timed out after {}ms", .elapsed.as_millis())]
    Timeout { elapsed: Duration },

    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Whole-order outcome errors returned to whoever invoked a delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Payment not completed")]
    PaymentNotCompleted,

    #[error("No RCON servers available for this product")]
    NoServersAvailable,

    #[error("Order cannot be claimed for delivery (status: {status})")]
    InProgress { status: DeliveryStatus },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_has_elapsed() {
        let err = TransportError::Timeout {
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "timed out after 1500ms");
    }

    #[test]
    fn test_frame_error_converts() {
        let err: TransportError = FrameError::InvalidLength(3).into();
        assert!(matches!(err, TransportError::Frame(_)));
    }

    #[test]
    fn test_in_progress_names_status() {
        let err = DeliveryError::InProgress {
            status: DeliveryStatus::Processing,
        };
        assert!(err.to_string().contains("processing"));
    }
}
