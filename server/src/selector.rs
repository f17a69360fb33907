//! Candidate server selection.

use log::debug;

use crate::store::{Database, DatabaseError, Product, RemoteServer};

/// Keeps enabled servers of `mode` and orders them by ascending priority.
/// Name breaks ties so the order is stable across calls.
pub fn rank_candidates(mode: &str, servers: Vec<RemoteServer>) -> Vec<RemoteServer> {
    let mut candidates: Vec<RemoteServer> = servers
        .into_iter()
        .filter(|s| s.enabled && s.mode == mode)
        .collect();
    candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
    candidates
}

/// Servers eligible to deliver `product`, best first.
///
/// Explicit assignments win outright; only a product with no assignments at
/// all falls back to every server of its mode. An empty result is not an
/// error here.
pub async fn select_candidates(db: &Database, product: &Product) -> Result<Vec<RemoteServer>, DatabaseError> {
    let assigned = db.list_assigned_servers(&product.id).await?;
    let servers = if assigned.is_empty() {
        debug!("Product {} has no server assignments, using mode {}", product.id, product.mode);
        db.list_servers_for_mode(&product.mode).await?
    } else {
        assigned
    };

    Ok(rank_candidates(&product.mode, servers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{seed_server, test_db};

    fn server(id: &str, mode: &str, priority: i64, enabled: bool) -> RemoteServer {
        RemoteServer {
            id: id.to_string(),
            name: format!("{id}-name"),
            host: "localhost".to_string(),
            port: 25575,
            mode: mode.to_string(),
            enabled,
            priority,
        }
    }

    #[test]
    fn test_rank_filters_and_sorts() {
        let ranked = rank_candidates(
            "survival",
            vec![
                server("c", "survival", 3, true),
                server("a", "survival", 1, true),
                server("off", "survival", 0, false),
                server("ls", "lifesteal", 0, true),
                server("b", "survival", 1, true),
            ],
        );
        let ids: Vec<&str> = ranked.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rank_empty() {
        assert!(rank_candidates("survival", vec![]).is_empty());
    }

    #[tokio::test]
    async fn test_assignment_overrides_mode_fallback() {
        let db = test_db().await;
        db.upsert_product("p1", "VIP", "survival").await.unwrap();
        seed_server(&db, "s1", "survival-1", "survival", 0, true).await;
        seed_server(&db, "s2", "survival-2", "survival", 5, true).await;
        db.assign_server("p1", "s2").await.unwrap();

        let product = db.get_product("p1").await.unwrap();
        let candidates = select_candidates(&db, &product).await.unwrap();
        let ids: Vec<&str> = candidates.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2"]);
    }

    #[tokio::test]
    async fn test_fallback_to_mode() {
        let db = test_db().await;
        db.upsert_product("p1", "VIP", "survival").await.unwrap();
        seed_server(&db, "s1", "survival-1", "survival", 2, true).await;
        seed_server(&db, "s2", "survival-2", "survival", 1, true).await;
        seed_server(&db, "s3", "lifesteal-1", "lifesteal", 0, true).await;

        let product = db.get_product("p1").await.unwrap();
        let candidates = select_candidates(&db, &product).await.unwrap();
        let ids: Vec<&str> = candidates.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }

    #[tokio::test]
    async fn test_disabled_assignment_yields_nothing() {
        let db = test_db().await;
        db.upsert_product("p1", "VIP", "survival").await.unwrap();
        seed_server(&db, "s1", "survival-1", "survival", 0, false).await;
        seed_server(&db, "s2", "survival-2", "survival", 0, true).await;
        db.assign_server("p1", "s1").await.unwrap();

        let product = db.get_product("p1").await.unwrap();
        assert!(select_candidates(&db, &product).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assignment_with_wrong_mode_is_dropped() {
        let db = test_db().await;
        db.upsert_product("p1", "VIP", "survival").await.unwrap();
        seed_server(&db, "s1", "lifesteal-1", "lifesteal", 0, true).await;
        db.assign_server("p1", "s1").await.unwrap();

        let product = db.get_product("p1").await.unwrap();
        assert!(select_candidates(&db, &product).await.unwrap().is_empty());
    }
}
