use super::db::{Database, DatabaseError};
use super::models::PresenceRecord;

impl Database {
    /// Marks a player online, remembering which server they joined.
    pub async fn record_join(
        &self,
        minecraft_ign: &str,
        server_name: Option<&str>,
        at: i64,
    ) -> Result<PresenceRecord, DatabaseError> {
        let record = sqlx::query_as::<_, PresenceRecord>(
            r"
            INSERT INTO player_status (minecraft_ign, online, server_name, last_join_at, updated_at)
            VALUES (?, 1, ?, ?, ?)
            ON CONFLICT(minecraft_ign) DO UPDATE SET
                online = 1,
                server_name = excluded.server_name,
                last_join_at = excluded.last_join_at,
                updated_at = excluded.updated_at
            RETURNING *
            ",
        )
        .bind(minecraft_ign)
        .bind(server_name)
        .bind(at)
        .bind(at)
        .fetch_one(self.pool())
        .await?;

        Ok(record)
    }

    /// Marks a player offline. A leave for an unknown player still creates a row.
    pub async fn record_leave(&self, minecraft_ign: &str, at: i64) -> Result<PresenceRecord, DatabaseError> {
        let record = sqlx::query_as::<_, PresenceRecord>(
            r"
            INSERT INTO player_status (minecraft_ign, online, last_leave_at, updated_at)
            VALUES (?, 0, ?, ?)
            ON CONFLICT(minecraft_ign) DO UPDATE SET
                online = 0,
                server_name = NULL,
                last_leave_at = excluded.last_leave_at,
                updated_at = excluded.updated_at
            RETURNING *
            ",
        )
        .bind(minecraft_ign)
        .bind(at)
        .bind(at)
        .fetch_one(self.pool())
        .await?;

        Ok(record)
    }

    pub async fn get_presence(&self, minecraft_ign: &str) -> Result<Option<PresenceRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, PresenceRecord>(
            "SELECT * FROM player_status WHERE minecraft_ign = ?",
        )
        .bind(minecraft_ign)
        .fetch_optional(self.pool())
        .await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::test_db;

    #[tokio::test]
    async fn test_join_then_leave() {
        let db = test_db().await;

        let joined = db.record_join("Steve", Some("survival-1"), 100).await.unwrap();
        assert!(joined.online);
        assert_eq!(joined.server_name.as_deref(), Some("survival-1"));
        assert_eq!(joined.last_join_at, Some(100));

        let left = db.record_leave("steve", 200).await.unwrap();
        assert!(!left.online);
        assert_eq!(left.server_name, None);
        assert_eq!(left.last_join_at, Some(100));
        assert_eq!(left.last_leave_at, Some(200));
        assert_eq!(left.minecraft_ign, "Steve");
    }

    #[tokio::test]
    async fn test_unknown_player_has_no_presence() {
        let db = test_db().await;
        assert!(db.get_presence("Nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_leave_without_join_creates_offline_row() {
        let db = test_db().await;
        db.record_leave("Alex", 50).await.unwrap();

        let record = db.get_presence("ALEX").await.unwrap().unwrap();
        assert!(!record.online);
        assert_eq!(record.last_join_at, None);
    }

    #[tokio::test]
    async fn test_rejoin_moves_server() {
        let db = test_db().await;
        db.record_join("Steve", Some("survival-1"), 1).await.unwrap();
        db.record_join("Steve", None, 2).await.unwrap();

        let record = db.get_presence("Steve").await.unwrap().unwrap();
        assert!(record.online);
        assert_eq!(record.server_name, None);
        assert_eq!(record.last_join_at, Some(2));
    }
}
