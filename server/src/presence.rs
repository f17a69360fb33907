//! Presence Tracker: player join/leave bookkeeping and queue draining.
//!
//! A join is the moment a queued delivery can plausibly succeed, so every
//! join retries the player's queued orders straight away, one at a time.

use chrono::DateTime;
use log::{debug, info};
use serde::Serialize;

use crate::delivery::{DeliveryOrchestrator, RetryOutcome};
use crate::store::{unix_timestamp, Database, DatabaseError, PresenceRecord};

/// What a join event did.
#[derive(Debug, Clone, Serialize)]
pub struct JoinSummary {
    pub player: String,
    pub server: Option<String>,
    pub delivery_results: Vec<RetryOutcome>,
}

#[derive(Clone)]
pub struct PresenceTracker {
    orchestrator: DeliveryOrchestrator,
}

impl PresenceTracker {
    pub fn new(orchestrator: DeliveryOrchestrator) -> Self {
        Self { orchestrator }
    }

    fn db(&self) -> &Database {
        self.orchestrator.db()
    }

    /// Marks the player online and retries their queued orders that fit the
    /// joined server.
    pub async fn join(
        &self,
        minecraft_ign: &str,
        server_name: Option<&str>,
        at: i64,
    ) -> Result<JoinSummary, DatabaseError> {
        self.db().record_join(minecraft_ign, server_name, at).await?;
        info!(
            "Player {} joined {}",
            minecraft_ign,
            server_name.unwrap_or("unknown server")
        );

        let registered_mode = match server_name {
            Some(name) => self.db().find_server_by_name(name).await?.map(|s| s.mode),
            None => None,
        };

        let queued = self.db().queued_for_player(minecraft_ign).await?;
        let total = queued.len();
        let matching: Vec<_> = queued
            .into_iter()
            .filter(|q| {
                mode_matches(
                    q.product_mode.as_deref(),
                    server_name,
                    registered_mode.as_deref(),
                )
            })
            .collect();
        if total > 0 {
            info!(
                "Found {} queued deliveries for {}, {} match this server",
                total,
                minecraft_ign,
                matching.len()
            );
        }

        let mut delivery_results = Vec::with_capacity(matching.len());
        for item in &matching {
            delivery_results.push(self.orchestrator.retry_queued(&item.entry.order_id).await);
        }

        Ok(JoinSummary {
            player: minecraft_ign.to_string(),
            server: server_name.map(str::to_string),
            delivery_results,
        })
    }

    pub async fn leave(&self, minecraft_ign: &str, at: i64) -> Result<PresenceRecord, DatabaseError> {
        let record = self.db().record_leave(minecraft_ign, at).await?;
        info!("Player {} left", minecraft_ign);
        Ok(record)
    }
}

/// Whether a queued product of `product_mode` may be delivered to a player
/// who just joined `server_name`.
///
/// A server name that matches a registered server is judged by that server's
/// declared mode. Otherwise the name only has to contain the mode token.
pub fn mode_matches(product_mode: Option<&str>, server_name: Option<&str>, registered_mode: Option<&str>) -> bool {
    let Some(server_name) = server_name else {
        return true;
    };
    let mode = match product_mode {
        Some(mode) if !mode.trim().is_empty() => mode,
        _ => return true,
    };

    match registered_mode {
        Some(declared) => declared.eq_ignore_ascii_case(mode),
        None => server_name.to_lowercase().contains(&mode.to_lowercase()),
    }
}

/// Event time from an optional RFC 3339 string; anything unusable means now.
pub fn parse_event_time(raw: Option<&str>) -> i64 {
    match raw.map(DateTime::parse_from_rfc3339) {
        Some(Ok(ts)) => ts.timestamp(),
        Some(Err(e)) => {
            debug!("Ignoring unparsable event timestamp: {}", e);
            unix_timestamp()
        }
        None => unix_timestamp(),
    }
}
