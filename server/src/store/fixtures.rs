//! Seed helpers shared by the store and engine unit tests.

use super::{Database, NewCommand, NewOrder, NewServer};

pub(crate) async fn test_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// Product `p1` (mode `survival`) plus a paid, pending order for `ign`.
pub(crate) async fn seed_order(db: &Database, id: &str, ign: &str) {
    db.upsert_product("p1", "VIP Rank", "survival").await.unwrap();
    db.insert_order(&NewOrder {
        id: id.to_string(),
        product_id: "p1".to_string(),
        user_id: None,
        minecraft_ign: ign.to_string(),
        is_gift: false,
        gift_recipient_ign: None,
        quantity: 1,
        payment_status: "completed".to_string(),
    })
    .await
    .unwrap();
}

pub(crate) async fn seed_server(db: &Database, id: &str, name: &str, mode: &str, priority: i64, enabled: bool) {
    db.upsert_server(&NewServer {
        id: id.to_string(),
        name: name.to_string(),
        host: "127.0.0.1".to_string(),
        port: 25575,
        mode: mode.to_string(),
        enabled,
        priority,
    })
    .await
    .unwrap();
}

pub(crate) async fn seed_command(db: &Database, product_id: &str, index: i64, text: &str, delay_ms: u32) {
    db.upsert_command(&NewCommand {
        id: format!("{product_id}-cmd-{index}"),
        product_id: product_id.to_string(),
        command_text: text.to_string(),
        delay_ms,
        enabled: true,
        order_index: index,
    })
    .await
    .unwrap();
}
