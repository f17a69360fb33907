//! Queue Manager: durable retry bookkeeping for undeliverable orders.

use log::{info, warn};
use shared::DeliveryStatus;
use thiserror::Error;

use crate::store::{unix_timestamp, Database, DatabaseError, QueueEntry, QueuedDelivery, RetryPolicy};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue entries can only be resolved to delivered or failed, not {0}")]
    InvalidOutcome(DeliveryStatus),

    #[error("No queue entry for order {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Clone)]
pub struct QueueManager {
    db: Database,
    policy: RetryPolicy,
}

impl QueueManager {
    pub fn new(db: Database, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }

    /// Creates the entry at attempt 1 or counts another attempt on it.
    pub async fn enqueue(&self, order_id: &str, recipient: &str, reason: &str) -> Result<QueueEntry, DatabaseError> {
        let entry = self
            .db
            .enqueue_delivery(order_id, recipient, reason, &self.policy)
            .await?;
        info!(
            "Queue entry for order {} is {} (attempt {}/{})",
            order_id, entry.status, entry.attempt_count, entry.max_attempts
        );
        Ok(entry)
    }

    /// Counts a failed retry against the entry, if it is still active.
    pub async fn record_failure(&self, order_id: &str, reason: &str) -> Result<Option<QueueEntry>, DatabaseError> {
        let entry = self.db.record_queue_failure(order_id, reason, &self.policy).await?;
        match &entry {
            Some(e) if e.attempts_exhausted() => {
                warn!("Order {} exhausted its {} delivery attempts", order_id, e.max_attempts)
            }
            Some(e) => info!(
                "Order {} retry failed (attempt {}/{}), next try after {:?}",
                order_id, e.attempt_count, e.max_attempts, e.next_attempt_at
            ),
            None => {}
        }
        Ok(entry)
    }

    /// Entries the sweeper may retry now: queued, under the cap, backoff elapsed.
    pub async fn retry_eligible(&self) -> Result<Vec<QueuedDelivery>, DatabaseError> {
        self.db
            .retry_eligible(self.policy.max_attempts, unix_timestamp())
            .await
    }

    pub async fn list(&self, status: Option<DeliveryStatus>) -> Result<Vec<QueueEntry>, DatabaseError> {
        self.db.list_queue(status).await
    }

    /// Terminal operator update. The order follows the entry: a forced
    /// failure fails a queued order, a forced delivery marks a queued or
    /// failed order delivered.
    pub async fn resolve(&self, order_id: &str, outcome: DeliveryStatus) -> Result<QueueEntry, QueueError> {
        if !outcome.is_terminal() {
            return Err(QueueError::InvalidOutcome(outcome));
        }
        if !self.db.resolve_queue_entry(order_id, outcome).await? {
            return Err(QueueError::NotFound(order_id.to_string()));
        }

        let from: &[DeliveryStatus] = match outcome {
            DeliveryStatus::Delivered => &[DeliveryStatus::Queued, DeliveryStatus::Failed],
            _ => &[DeliveryStatus::Queued],
        };
        if self.db.transition_order(order_id, from, outcome).await? {
            info!("Order {} marked {} by operator", order_id, outcome);
        }
        info!("Queue entry for order {} resolved as {}", order_id, outcome);

        self.db
            .get_queue_entry(order_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(order_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{seed_order, test_db};

    async fn manager(max_attempts: i64) -> QueueManager {
        let db = test_db().await;
        seed_order(&db, "o1", "Steve").await;
        QueueManager::new(
            db,
            RetryPolicy {
                max_attempts,
                backoff_base_secs: 0,
                backoff_max_secs: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_enqueue_then_eligible() {
        let queue = manager(3).await;
        queue.enqueue("o1", "Steve", "offline").await.unwrap();

        let eligible = queue.retry_eligible().await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].entry.order_id, "o1");
    }

    #[tokio::test]
    async fn test_capped_entry_never_eligible() {
        let queue = manager(2).await;
        queue.enqueue("o1", "Steve", "offline").await.unwrap();
        let entry = queue.record_failure("o1", "down").await.unwrap().unwrap();
        assert_eq!(entry.attempt_count, 2);
        assert_eq!(entry.status, "failed");

        assert!(queue.retry_eligible().await.unwrap().is_empty());
        assert!(queue.record_failure("o1", "down").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_rejects_non_terminal() {
        let queue = manager(3).await;
        queue.enqueue("o1", "Steve", "offline").await.unwrap();

        let err = queue.resolve("o1", DeliveryStatus::Queued).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidOutcome(DeliveryStatus::Queued)));
    }

    #[tokio::test]
    async fn test_resolve_missing_entry() {
        let queue = manager(3).await;
        let err = queue.resolve("o1", DeliveryStatus::Delivered).await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_forced_failure_fails_queued_order() {
        let queue = manager(3).await;
        queue.db.transition_order("o1", &[DeliveryStatus::Pending], DeliveryStatus::Queued)
            .await
            .unwrap();
        queue.enqueue("o1", "Steve", "offline").await.unwrap();

        let entry = queue.resolve("o1", DeliveryStatus::Failed).await.unwrap();
        assert_eq!(entry.status, "failed");
        assert_eq!(queue.db.get_order("o1").await.unwrap().delivery_status, "failed");
        assert!(queue.list(Some(DeliveryStatus::Queued)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forced_delivery_delivers_queued_order() {
        let queue = manager(3).await;
        queue.db.transition_order("o1", &[DeliveryStatus::Pending], DeliveryStatus::Queued)
            .await
            .unwrap();
        queue.enqueue("o1", "Steve", "offline").await.unwrap();

        let entry = queue.resolve("o1", DeliveryStatus::Delivered).await.unwrap();
        assert_eq!(entry.status, "delivered");
        assert_eq!(queue.db.get_order("o1").await.unwrap().delivery_status, "delivered");
        assert!(queue.db.queued_for_player("Steve").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forced_delivery_delivers_failed_order() {
        let queue = manager(1).await;
        queue.db.transition_order("o1", &[DeliveryStatus::Pending], DeliveryStatus::Failed)
            .await
            .unwrap();
        let entry = queue.enqueue("o1", "Steve", "offline").await.unwrap();
        assert_eq!(entry.status, "failed");

        queue.resolve("o1", DeliveryStatus::Delivered).await.unwrap();
        assert_eq!(queue.db.get_order("o1").await.unwrap().delivery_status, "delivered");
    }
}
