//! Row types for the delivery store.

use serde::{Deserialize, Serialize};
use shared::{DeliveryStatus, PaymentStatus};

use super::db::DatabaseError;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub mode: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub product_id: String,
    pub user_id: Option<String>,
    pub minecraft_ign: String,
    pub is_gift: bool,
    pub gift_recipient_ign: Option<String>,
    pub quantity: i64,
    pub payment_status: String,
    pub delivery_status: String,
    pub delivery_log: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Player who receives the goods: the gift recipient when this is a gift
    /// with a recipient set, otherwise the buyer.
    pub fn recipient(&self) -> &str {
        match self.gift_recipient_ign.as_deref() {
            Some(ign) if self.is_gift && !ign.trim().is_empty() => ign,
            _ => &self.minecraft_ign,
        }
    }

    pub fn payment_status(&self) -> Result<PaymentStatus, DatabaseError> {
        self.payment_status.parse().map_err(DatabaseError::Corrupt)
    }

    pub fn delivery_status(&self) -> Result<DeliveryStatus, DatabaseError> {
        self.delivery_status.parse().map_err(DatabaseError::Corrupt)
    }

    pub fn quantity(&self) -> Result<u32, DatabaseError> {
        u32::try_from(self.quantity)
            .map_err(|_| DatabaseError::Corrupt(format!("order {} has quantity {}", self.id, self.quantity)))
    }
}

/// One step of a product's delivery script.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryCommand {
    pub id: String,
    pub product_id: String,
    pub command_text: String,
    pub delay_ms: i64,
    pub enabled: bool,
    pub order_index: i64,
}

/// A remote console endpoint. Its secret lives in the secret store, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RemoteServer {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: i64,
    pub mode: String,
    pub enabled: bool,
    pub priority: i64,
}

impl RemoteServer {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryLogEntry {
    pub id: i64,
    pub order_id: String,
    pub rcon_server_id: Option<String>,
    pub server_name: String,
    pub command_text: Option<String>,
    pub status: String,
    pub response: Option<String>,
    pub error_message: Option<String>,
    pub execution_time_ms: i64,
    pub created_at: i64,
}

impl DeliveryLogEntry {
    pub fn succeeded(&self) -> bool {
        self.status == "success"
    }
}

/// Insert parameters for a delivery log row.
#[derive(Debug, Clone)]
pub struct NewDeliveryLog<'a> {
    pub order_id: &'a str,
    pub rcon_server_id: Option<&'a str>,
    pub server_name: &'a str,
    pub command_text: Option<&'a str>,
    pub success: bool,
    pub response: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub execution_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueEntry {
    pub id: String,
    pub order_id: String,
    pub minecraft_ign: String,
    pub status: String,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub last_attempt_at: Option<i64>,
    pub next_attempt_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl QueueEntry {
    pub fn status(&self) -> Result<DeliveryStatus, DatabaseError> {
        self.status.parse().map_err(DatabaseError::Corrupt)
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// A queue entry joined with the game mode of its order's product.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueuedDelivery {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub entry: QueueEntry,
    pub product_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PresenceRecord {
    pub minecraft_ign: String,
    pub online: bool,
    pub server_name: Option<String>,
    pub last_join_at: Option<i64>,
    pub last_leave_at: Option<i64>,
    pub updated_at: i64,
}
