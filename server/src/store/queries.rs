//! Order status transitions and the delivery audit log.

use shared::DeliveryStatus;

use super::db::{unix_timestamp, Database, DatabaseError};
use super::models::{DeliveryLogEntry, NewDeliveryLog, Order};

impl Database {
    // =========================================================================
    // Orders
    // =========================================================================

    pub async fn get_order(&self, id: &str) -> Result<Order, DatabaseError> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("order {id}")))
    }

    /// Moves an order to `to` only if it is currently in one of `from`.
    ///
    /// Returns false when another writer got there first; the caller decides
    /// whether that is worth reporting.
    pub async fn transition_order(
        &self,
        id: &str,
        from: &[DeliveryStatus],
        to: DeliveryStatus,
    ) -> Result<bool, DatabaseError> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE orders SET delivery_status = ?, updated_at = ? WHERE id = ? AND delivery_status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(unix_timestamp()).bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query.execute(self.pool()).await?;

        Ok(result.rows_affected() == 1)
    }

    /// Writes the terminal status and attempt snapshot of a processing order.
    ///
    /// Only applies while the order is still `processing`.
    pub async fn finish_order(
        &self,
        id: &str,
        status: DeliveryStatus,
        delivery_log: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders SET delivery_status = ?, delivery_log = ?, updated_at = ? WHERE id = ? AND delivery_status = 'processing'",
        )
        .bind(status.as_str())
        .bind(delivery_log)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Delivery logs (append-only)
    // =========================================================================

    pub async fn insert_delivery_log(&self, log: &NewDeliveryLog<'_>) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            r"
            INSERT INTO delivery_logs
                (order_id, rcon_server_id, server_name, command_text, status, response, error_message, execution_time_ms, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(log.order_id)
        .bind(log.rcon_server_id)
        .bind(log.server_name)
        .bind(log.command_text)
        .bind(if log.success { "success" } else { "failed" })
        .bind(log.response)
        .bind(log.error_message)
        .bind(log.execution_time_ms)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All log rows for an order in insertion order.
    pub async fn list_delivery_logs(&self, order_id: &str) -> Result<Vec<DeliveryLogEntry>, DatabaseError> {
        let rows = sqlx::query_as::<_, DeliveryLogEntry>(
            "SELECT * FROM delivery_logs WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(order_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}
