//! Retry queue bookkeeping. One row per order, enforced by a unique key.

use shared::DeliveryStatus;

use super::db::{unix_timestamp, Database, DatabaseError};
use super::models::{QueueEntry, QueuedDelivery};

/// Attempt cap and exponential backoff applied when a delivery is deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i64,
    pub backoff_base_secs: i64,
    pub backoff_max_secs: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_secs: 60,
            backoff_max_secs: 3600,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn backoff_secs(&self, attempt: i64) -> i64 {
        let shift = (attempt.max(1) - 1).min(20) as u32;
        self.backoff_base_secs
            .saturating_mul(1i64 << shift)
            .min(self.backoff_max_secs)
    }
}

const QUEUED_WITH_MODE: &str = r"
    SELECT q.*, p.mode AS product_mode
    FROM delivery_queue q
    JOIN orders o ON o.id = q.order_id
    LEFT JOIN products p ON p.id = o.product_id
";

impl Database {
    /// Creates or bumps the queue entry for an order in one statement.
    ///
    /// A new entry starts at attempt 1. An existing entry has its attempt
    /// count incremented (never past its own cap) and flips to `failed` once
    /// the cap is reached.
    pub async fn enqueue_delivery(
        &self,
        order_id: &str,
        minecraft_ign: &str,
        reason: &str,
        policy: &RetryPolicy,
    ) -> Result<QueueEntry, DatabaseError> {
        let now = unix_timestamp();
        let max_attempts = policy.max_attempts.max(1);
        let first_status = if max_attempts <= 1 {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Queued
        };

        let entry = sqlx::query_as::<_, QueueEntry>(
            r"
            INSERT INTO delivery_queue
                (id, order_id, minecraft_ign, status, attempt_count, max_attempts,
                 last_attempt_at, next_attempt_at, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(order_id) DO UPDATE SET
                minecraft_ign = excluded.minecraft_ign,
                attempt_count = MIN(delivery_queue.attempt_count + 1, delivery_queue.max_attempts),
                status = CASE
                    WHEN delivery_queue.attempt_count + 1 >= delivery_queue.max_attempts THEN 'failed'
                    ELSE 'queued'
                END,
                last_attempt_at = excluded.last_attempt_at,
                next_attempt_at = excluded.last_attempt_at
                    + MIN(? << MIN(delivery_queue.attempt_count, 20), ?),
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            RETURNING *
            ",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(order_id)
        .bind(minecraft_ign)
        .bind(first_status.as_str())
        .bind(max_attempts)
        .bind(now)
        .bind(now + policy.backoff_secs(1))
        .bind(reason)
        .bind(now)
        .bind(now)
        .bind(policy.backoff_base_secs)
        .bind(policy.backoff_max_secs)
        .fetch_one(self.pool())
        .await?;

        Ok(entry)
    }

    /// Counts a failed retry against an active entry.
    ///
    /// Returns None when the order has no active entry (already resolved).
    pub async fn record_queue_failure(
        &self,
        order_id: &str,
        reason: &str,
        policy: &RetryPolicy,
    ) -> Result<Option<QueueEntry>, DatabaseError> {
        let now = unix_timestamp();
        let entry = sqlx::query_as::<_, QueueEntry>(
            r"
            UPDATE delivery_queue SET
                attempt_count = MIN(attempt_count + 1, max_attempts),
                status = CASE WHEN attempt_count + 1 >= max_attempts THEN 'failed' ELSE 'queued' END,
                last_attempt_at = ?,
                next_attempt_at = ? + MIN(? << MIN(attempt_count, 20), ?),
                error_message = ?,
                updated_at = ?
            WHERE order_id = ? AND status IN ('pending', 'queued', 'processing')
            RETURNING *
            ",
        )
        .bind(now)
        .bind(now)
        .bind(policy.backoff_base_secs)
        .bind(policy.backoff_max_secs)
        .bind(reason)
        .bind(now)
        .bind(order_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(entry)
    }

    /// Terminal update of an order's queue entry.
    pub async fn resolve_queue_entry(
        &self,
        order_id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, DatabaseError> {
        let now = unix_timestamp();
        let result = sqlx::query(
            r"
            UPDATE delivery_queue
            SET status = ?, last_attempt_at = ?, next_attempt_at = NULL, updated_at = ?
            WHERE order_id = ?
            ",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(order_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_queue_entry(&self, order_id: &str) -> Result<Option<QueueEntry>, DatabaseError> {
        let entry = sqlx::query_as::<_, QueueEntry>("SELECT * FROM delivery_queue WHERE order_id = ?")
            .bind(order_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(entry)
    }

    /// Queue entries, newest first, optionally filtered by status.
    pub async fn list_queue(&self, status: Option<DeliveryStatus>) -> Result<Vec<QueueEntry>, DatabaseError> {
        let entries = match status {
            Some(status) => {
                sqlx::query_as::<_, QueueEntry>(
                    "SELECT * FROM delivery_queue WHERE status = ? ORDER BY created_at DESC, id ASC",
                )
                .bind(status.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, QueueEntry>(
                    "SELECT * FROM delivery_queue ORDER BY created_at DESC, id ASC",
                )
                .fetch_all(self.pool())
                .await?
            }
        };

        Ok(entries)
    }

    /// Queued, under-cap entries waiting for one player.
    pub async fn queued_for_player(&self, minecraft_ign: &str) -> Result<Vec<QueuedDelivery>, DatabaseError> {
        let sql = format!(
            "{QUEUED_WITH_MODE} WHERE q.minecraft_ign = ? AND q.status = 'queued' AND q.attempt_count < q.max_attempts ORDER BY q.created_at ASC"
        );
        let rows = sqlx::query_as::<_, QueuedDelivery>(&sql)
            .bind(minecraft_ign)
            .fetch_all(self.pool())
            .await?;

        Ok(rows)
    }

    /// Queued entries below `max_attempts` (and their own cap) whose backoff
    /// has elapsed at `now`.
    pub async fn retry_eligible(&self, max_attempts: i64, now: i64) -> Result<Vec<QueuedDelivery>, DatabaseError> {
        let sql = format!(
            r"{QUEUED_WITH_MODE}
            WHERE q.status = 'queued'
              AND q.attempt_count < q.max_attempts
              AND q.attempt_count < ?
              AND (q.next_attempt_at IS NULL OR q.next_attempt_at <= ?)
            ORDER BY q.next_attempt_at ASC"
        );
        let rows = sqlx::query_as::<_, QueuedDelivery>(&sql)
            .bind(max_attempts)
            .bind(now)
            .fetch_all(self.pool())
            .await?;

        Ok(rows)
    }
}
