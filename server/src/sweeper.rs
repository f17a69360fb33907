//! Periodic retry of queued deliveries whose recipient is already online.
//!
//! Joins remain the main trigger; the sweeper only covers players who stayed
//! online while every server was down. It honours each entry's backoff.

use log::{debug, error, info};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::delivery::{DeliveryOrchestrator, RetryOutcome};
use crate::store::DatabaseError;

/// Retries every eligible entry whose player is online. Returns the outcomes.
pub async fn sweep_once(orchestrator: &DeliveryOrchestrator) -> Result<Vec<RetryOutcome>, DatabaseError> {
    let eligible = orchestrator.queue().retry_eligible().await?;
    let mut outcomes = Vec::new();

    for item in eligible {
        let online = orchestrator
            .db()
            .get_presence(&item.entry.minecraft_ign)
            .await?
            .is_some_and(|p| p.online);
        if !online {
            continue;
        }
        debug!("Sweeper retrying order {} for {}", item.entry.order_id, item.entry.minecraft_ign);
        outcomes.push(orchestrator.retry_queued(&item.entry.order_id).await);
    }

    Ok(outcomes)
}

/// Spawns the sweeper loop on the current runtime.
pub fn spawn_retry_sweeper(orchestrator: DeliveryOrchestrator, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Retry sweeper running every {:?}", period);

        // First tick fires immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            match sweep_once(&orchestrator).await {
                Ok(outcomes) if !outcomes.is_empty() => {
                    let delivered = outcomes.iter().filter(|o| o.success).count();
                    info!("Sweeper retried {} orders, {} delivered", outcomes.len(), delivered);
                }
                Ok(_) => {}
                Err(e) => error!("Retry sweep failed: {}", e),
            }
        }
    })
}
