//! Start-up catalog loader.
//!
//! Products, servers, commands and assignments are normally written by admin
//! tooling. For local runs and demos they can be seeded from one JSON file;
//! everything is upserted, so loading the same file twice is harmless.

use log::info;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::store::{Database, DatabaseError, NewCommand, NewOrder, NewServer};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub id: String,
    pub name: String,
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub product_id: String,
    pub server_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub products: Vec<NewProduct>,
    pub servers: Vec<NewServer>,
    pub commands: Vec<NewCommand>,
    pub assignments: Vec<Assignment>,
    pub orders: Vec<NewOrder>,
}

impl Catalog {
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Writes the catalog. Orders that already exist are left untouched.
    pub async fn apply(&self, db: &Database) -> Result<(), CatalogError> {
        for product in &self.products {
            db.upsert_product(&product.id, &product.name, &product.mode).await?;
        }
        for server in &self.servers {
            db.upsert_server(server).await?;
        }
        for command in &self.commands {
            db.upsert_command(command).await?;
        }
        for assignment in &self.assignments {
            db.assign_server(&assignment.product_id, &assignment.server_id).await?;
        }

        let mut inserted = 0;
        for order in &self.orders {
            match db.get_order(&order.id).await {
                Ok(_) => continue,
                Err(DatabaseError::NotFound(_)) => {
                    db.insert_order(order).await?;
                    inserted += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Catalog loaded: {} products, {} servers, {} commands, {} assignments, {} new orders",
            self.products.len(),
            self.servers.len(),
            self.commands.len(),
            self.assignments.len(),
            inserted
        );
        Ok(())
    }
}

pub async fn load_catalog(db: &Database, path: &Path) -> Result<Catalog, CatalogError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let catalog = Catalog::from_json(&raw)?;
    catalog.apply(db).await?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::test_db;

    const SAMPLE: &str = r#"{
        "products": [{"id": "vip", "name": "VIP Rank", "mode": "survival"}],
        "servers": [
            {"id": "s1", "name": "survival-1", "host": "127.0.0.1", "port": 25575, "mode": "survival", "priority": 1}
        ],
        "commands": [
            {"id": "c1", "product_id": "vip", "command_text": "lp user {player} parent add vip", "order_index": 0},
            {"id": "c2", "product_id": "vip", "command_text": "say welcome {player}", "delay_ms": 500, "order_index": 1}
        ],
        "assignments": [{"product_id": "vip", "server_id": "s1"}],
        "orders": [{"id": "o1", "product_id": "vip", "minecraft_ign": "Steve"}]
    }"#;

    #[tokio::test]
    async fn test_apply_sample_twice() {
        let db = test_db().await;
        let catalog = Catalog::from_json(SAMPLE).unwrap();
        catalog.apply(&db).await.unwrap();
        catalog.apply(&db).await.unwrap();

        let commands = db.list_enabled_commands("vip").await.unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].delay_ms, 500);

        let servers = db.list_assigned_servers("vip").await.unwrap();
        assert_eq!(servers.len(), 1);
        assert!(servers[0].enabled);

        let order = db.get_order("o1").await.unwrap();
        assert_eq!(order.payment_status, "completed");
        assert_eq!(order.quantity, 1);
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let catalog = Catalog::from_json("{}").unwrap();
        assert!(catalog.products.is_empty());
        assert!(catalog.orders.is_empty());
    }

    #[test]
    fn test_rejects_bad_port() {
        let raw = r#"{"servers": [{"id": "s", "name": "n", "host": "h", "port": 70000, "mode": "m"}]}"#;
        assert!(matches!(Catalog::from_json(raw), Err(CatalogError::Parse(_))));
    }
}
