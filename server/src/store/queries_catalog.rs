//! Catalog reads used by delivery, plus the writes the catalog loader needs.

use serde::Deserialize;

use super::db::{unix_timestamp, Database, DatabaseError};
use super::models::{DeliveryCommand, Product, RemoteServer};

fn default_true() -> bool {
    true
}

fn default_quantity() -> i64 {
    1
}

fn default_payment() -> String {
    "completed".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewServer {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub mode: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCommand {
    pub id: String,
    pub product_id: String,
    pub command_text: String,
    #[serde(default)]
    pub delay_ms: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub order_index: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub minecraft_ign: String,
    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub gift_recipient_ign: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default = "default_payment")]
    pub payment_status: String,
}

impl Database {
    // =========================================================================
    // Products and delivery scripts
    // =========================================================================

    pub async fn get_product(&self, id: &str) -> Result<Product, DatabaseError> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("product {id}")))
    }

    pub async fn upsert_product(&self, id: &str, name: &str, mode: &str) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        sqlx::query(
            r"
            INSERT INTO products (id, name, mode, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, mode = excluded.mode, updated_at = excluded.updated_at
            ",
        )
        .bind(id)
        .bind(name)
        .bind(mode)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Enabled commands of a product in execution order.
    pub async fn list_enabled_commands(&self, product_id: &str) -> Result<Vec<DeliveryCommand>, DatabaseError> {
        let commands = sqlx::query_as::<_, DeliveryCommand>(
            "SELECT * FROM delivery_commands WHERE product_id = ? AND enabled = 1 ORDER BY order_index ASC",
        )
        .bind(product_id)
        .fetch_all(self.pool())
        .await?;

        Ok(commands)
    }

    pub async fn upsert_command(&self, command: &NewCommand) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO delivery_commands (id, product_id, command_text, delay_ms, enabled, order_index)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                product_id = excluded.product_id,
                command_text = excluded.command_text,
                delay_ms = excluded.delay_ms,
                enabled = excluded.enabled,
                order_index = excluded.order_index
            ",
        )
        .bind(&command.id)
        .bind(&command.product_id)
        .bind(&command.command_text)
        .bind(i64::from(command.delay_ms))
        .bind(command.enabled)
        .bind(command.order_index)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    // =========================================================================
    // Remote servers and assignments
    // =========================================================================

    pub async fn upsert_server(&self, server: &NewServer) -> Result<(), DatabaseError> {
        sqlx::query(
            r"
            INSERT INTO rcon_servers (id, name, host, port, mode, enabled, priority)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                host = excluded.host,
                port = excluded.port,
                mode = excluded.mode,
                enabled = excluded.enabled,
                priority = excluded.priority
            ",
        )
        .bind(&server.id)
        .bind(&server.name)
        .bind(&server.host)
        .bind(i64::from(server.port))
        .bind(&server.mode)
        .bind(server.enabled)
        .bind(server.priority)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn assign_server(&self, product_id: &str, server_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO product_rcon_servers (product_id, rcon_server_id) VALUES (?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(product_id)
        .bind(server_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Every server explicitly assigned to a product, enabled or not.
    pub async fn list_assigned_servers(&self, product_id: &str) -> Result<Vec<RemoteServer>, DatabaseError> {
        let servers = sqlx::query_as::<_, RemoteServer>(
            r"
            SELECT s.* FROM rcon_servers s
            JOIN product_rcon_servers ps ON ps.rcon_server_id = s.id
            WHERE ps.product_id = ?
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool())
        .await?;

        Ok(servers)
    }

    /// Enabled servers of one game mode, lowest priority value first.
    pub async fn list_servers_for_mode(&self, mode: &str) -> Result<Vec<RemoteServer>, DatabaseError> {
        let servers = sqlx::query_as::<_, RemoteServer>(
            "SELECT * FROM rcon_servers WHERE enabled = 1 AND mode = ? ORDER BY priority ASC, name ASC",
        )
        .bind(mode)
        .fetch_all(self.pool())
        .await?;

        Ok(servers)
    }

    pub async fn find_server_by_name(&self, name: &str) -> Result<Option<RemoteServer>, DatabaseError> {
        let server = sqlx::query_as::<_, RemoteServer>(
            "SELECT * FROM rcon_servers WHERE name = ? COLLATE NOCASE",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;

        Ok(server)
    }

    // =========================================================================
    // Orders (normally created by the payment flow)
    // =========================================================================

    pub async fn insert_order(&self, order: &NewOrder) -> Result<(), DatabaseError> {
        let now = unix_timestamp();
        sqlx::query(
            r"
            INSERT INTO orders
                (id, product_id, user_id, minecraft_ign, is_gift, gift_recipient_ign, quantity, payment_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&order.id)
        .bind(&order.product_id)
        .bind(&order.user_id)
        .bind(&order.minecraft_ign)
        .bind(order.is_gift)
        .bind(&order.gift_recipient_ign)
        .bind(order.quantity)
        .bind(&order.payment_status)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}
