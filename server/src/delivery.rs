//! # Delivery Orchestrator
//!
//! Turns one paid order into executed remote commands.
//!
//! ## Lifecycle
//!
//! An invocation claims the order by moving it to `processing` with a
//! conditional update, so two concurrent invocations for the same order can
//! never both run. The claimed order then ends in exactly one of:
//!
//! - `delivered`: some candidate server ran the whole script
//! - `queued`: every candidate failed and the recipient is offline
//! - `failed`: every candidate failed with the recipient online, the queue
//!   entry hit its attempt cap, or the product has no eligible servers
//!
//! ## Failover
//!
//! Candidates are tried in priority order. Each candidate gets the full
//! script from the first command; the first failing command abandons that
//! candidate. Scripts therefore have to be idempotent.
//!
//! Every command attempt, and every candidate skipped for lack of a secret,
//! leaves one append-only log row.

use log::{debug, error, info, warn};
use serde::Serialize;
use shared::{
    render_command, AttemptLog, DeliveryMode, DeliveryReport, DeliveryStatus, PaymentStatus,
    RenderContext,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DeliveryConfig, SecretStore};
use crate::error::DeliveryError;
use crate::queue::QueueManager;
use crate::selector::select_candidates;
use crate::store::{Database, DatabaseError, DeliveryCommand, NewDeliveryLog, RemoteServer};
use crate::transport::CommandTransport;

const NO_CREDENTIAL: &str = "no credential configured";

/// Result of retrying one queued order, as reported to presence callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryOutcome {
    pub order_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct DeliveryOrchestrator {
    db: Database,
    transport: Arc<dyn CommandTransport>,
    secrets: Arc<SecretStore>,
    queue: QueueManager,
    config: Arc<DeliveryConfig>,
}

impl DeliveryOrchestrator {
    pub fn new(
        db: Database,
        transport: Arc<dyn CommandTransport>,
        secrets: Arc<SecretStore>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            queue: QueueManager::new(db.clone(), config.retry),
            db,
            transport,
            secrets,
            config: Arc::new(config),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    /// Delivers one order and reports the whole-order outcome.
    ///
    /// Per-server failures never surface as errors; they only show up in the
    /// report's logs. Precondition failures return before any state change.
    pub async fn deliver(&self, order_id: &str, mode: DeliveryMode) -> Result<DeliveryReport, DeliveryError> {
        let order = self.db.get_order(order_id).await.map_err(|e| match e {
            DatabaseError::NotFound(_) => DeliveryError::OrderNotFound(order_id.to_string()),
            other => other.into(),
        })?;

        if order.payment_status()? != PaymentStatus::Completed {
            warn!("Refusing to deliver order {}: payment is {}", order_id, order.payment_status);
            return Err(DeliveryError::PaymentNotCompleted);
        }
        let quantity = order.quantity()?;

        let product = self.db.get_product(&order.product_id).await.map_err(|e| match e {
            DatabaseError::NotFound(_) => DeliveryError::ProductNotFound(order.product_id.clone()),
            other => other.into(),
        })?;
        let commands = self.db.list_enabled_commands(&product.id).await?;

        let mut candidates = if commands.is_empty() {
            Vec::new()
        } else {
            select_candidates(&self.db, &product).await?
        };
        if candidates.len() > self.config.max_candidates {
            warn!(
                "Order {}: {} candidate servers, trying only the first {}",
                order_id,
                candidates.len(),
                self.config.max_candidates
            );
            candidates.truncate(self.config.max_candidates);
        }

        if !self
            .db
            .transition_order(order_id, mode.claimable(), DeliveryStatus::Processing)
            .await?
        {
            return self.unclaimable(order_id).await;
        }
        info!("Order {} is processing ({:?}, product {})", order_id, mode, product.name);

        if commands.is_empty() {
            info!("Order {}: product {} has no enabled commands, nothing to deliver", order_id, product.id);
            self.finish(order_id, DeliveryStatus::Delivered, &[]).await?;
            self.db.resolve_queue_entry(order_id, DeliveryStatus::Delivered).await?;
            return Ok(report(order_id, DeliveryStatus::Delivered, Vec::new()));
        }

        if candidates.is_empty() {
            error!("Order {}: no eligible servers for mode {}", order_id, product.mode);
            self.finish(order_id, DeliveryStatus::Failed, &[]).await?;
            return Err(DeliveryError::NoServersAvailable);
        }

        debug!(
            "Order {}: {} candidates x {} commands, worst case {:?}",
            order_id,
            candidates.len(),
            commands.len(),
            self.config.worst_case(candidates.len(), commands.len())
        );

        let recipient = order.recipient().to_string();
        let ctx = RenderContext::new(recipient.clone(), quantity, product.name.clone());
        let mut logs = Vec::new();

        for server in &candidates {
            if self.run_script(order_id, server, &commands, &ctx, &mut logs).await {
                info!("Order {} delivered to {} via {}", order_id, recipient, server.name);
                self.finish(order_id, DeliveryStatus::Delivered, &logs).await?;
                self.db.resolve_queue_entry(order_id, DeliveryStatus::Delivered).await?;
                return Ok(report(order_id, DeliveryStatus::Delivered, logs));
            }
        }

        self.settle_exhausted(order_id, &recipient, logs).await
    }

    /// Retries a queued order and keeps its queue entry in step.
    ///
    /// A retry that ends `queued` has already been counted by the enqueue.
    /// Any other failure is counted here, and while the entry stays under its
    /// cap the order goes back to `queued` so the next trigger can claim it.
    pub async fn retry_queued(&self, order_id: &str) -> RetryOutcome {
        let failure = match self.deliver(order_id, DeliveryMode::Retry).await {
            Ok(report) if report.success => {
                return RetryOutcome {
                    order_id: order_id.to_string(),
                    success: true,
                    error: None,
                }
            }
            Ok(report) if report.queued => {
                return RetryOutcome {
                    order_id: order_id.to_string(),
                    success: false,
                    error: Some(last_error(&report.logs)),
                }
            }
            Ok(report) => last_error(&report.logs),
            Err(e @ DeliveryError::InProgress { .. }) => {
                debug!("Skipping retry of order {}: {}", order_id, e);
                return RetryOutcome {
                    order_id: order_id.to_string(),
                    success: false,
                    error: Some(e.to_string()),
                };
            }
            Err(e) => {
                warn!("Retry of order {} failed: {}", order_id, e);
                e.to_string()
            }
        };

        if let Err(e) = self.count_failed_retry(order_id, &failure).await {
            error!("Failed to update queue entry for order {}: {}", order_id, e);
        }
        RetryOutcome {
            order_id: order_id.to_string(),
            success: false,
            error: Some(failure),
        }
    }

    async fn count_failed_retry(&self, order_id: &str, reason: &str) -> Result<(), DatabaseError> {
        let Some(entry) = self.queue.record_failure(order_id, reason).await? else {
            return Ok(());
        };
        if entry.status()? == DeliveryStatus::Queued
            && self
                .db
                .transition_order(order_id, &[DeliveryStatus::Failed], DeliveryStatus::Queued)
                .await?
        {
            info!("Order {} is queued again", order_id);
        }
        Ok(())
    }

    /// Runs the whole script on one server. Returns true when every command
    /// succeeded; stops at the first failure.
    async fn run_script(
        &self,
        order_id: &str,
        server: &RemoteServer,
        commands: &[DeliveryCommand],
        ctx: &RenderContext,
        logs: &mut Vec<AttemptLog>,
    ) -> bool {
        let Some(secret) = self.secrets.lookup(server) else {
            warn!("Order {}: skipping {}, {}", order_id, server.name, NO_CREDENTIAL);
            self.record(&NewDeliveryLog {
                order_id,
                rcon_server_id: Some(server.id.as_str()),
                server_name: &server.name,
                command_text: None,
                success: false,
                response: None,
                error_message: Some(NO_CREDENTIAL),
                execution_time_ms: 0,
            })
            .await;
            logs.push(AttemptLog {
                server: server.name.clone(),
                command: "N/A".to_string(),
                success: false,
                response: None,
                error: Some(NO_CREDENTIAL.to_string()),
            });
            return false;
        };

        for command in commands {
            if command.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(command.delay_ms.unsigned_abs())).await;
            }

            let rendered = render_command(&command.command_text, ctx);
            let started = Instant::now();
            let outcome = self.transport.execute(server, secret, &rendered).await;
            let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

            let (response, error) = match outcome {
                Ok(response) => (Some(response), None),
                Err(e) => (None, Some(e.to_string())),
            };
            self.record(&NewDeliveryLog {
                order_id,
                rcon_server_id: Some(server.id.as_str()),
                server_name: &server.name,
                command_text: Some(rendered.as_str()),
                success: error.is_none(),
                response: response.as_deref(),
                error_message: error.as_deref(),
                execution_time_ms: elapsed_ms,
            })
            .await;

            let failed = error.is_some();
            logs.push(AttemptLog {
                server: server.name.clone(),
                command: rendered,
                success: !failed,
                response,
                error,
            });

            if failed {
                warn!("Order {}: abandoning {} after a failed command", order_id, server.name);
                return false;
            }
        }

        true
    }

    /// Every candidate failed: queue for later if the recipient is offline.
    async fn settle_exhausted(
        &self,
        order_id: &str,
        recipient: &str,
        logs: Vec<AttemptLog>,
    ) -> Result<DeliveryReport, DeliveryError> {
        let online = self
            .db
            .get_presence(recipient)
            .await?
            .is_some_and(|p| p.online);

        let (status, queued) = if online {
            warn!("Order {}: all servers failed while {} is online", order_id, recipient);
            (DeliveryStatus::Failed, false)
        } else {
            let reason = last_error(&logs);
            let entry = self.queue.enqueue(order_id, recipient, &reason).await?;
            if entry.attempts_exhausted() {
                warn!(
                    "Order {}: retry limit reached after {} attempts",
                    order_id, entry.attempt_count
                );
                (DeliveryStatus::Failed, false)
            } else {
                info!("Order {} queued until {} is back online", order_id, recipient);
                (DeliveryStatus::Queued, true)
            }
        };

        self.finish(order_id, status, &logs).await?;
        Ok(DeliveryReport {
            order_id: order_id.to_string(),
            success: false,
            queued,
            status,
            logs,
        })
    }

    /// The claim lost; work out whether that is benign.
    async fn unclaimable(&self, order_id: &str) -> Result<DeliveryReport, DeliveryError> {
        let status = self.db.get_order(order_id).await?.delivery_status()?;
        if status == DeliveryStatus::Delivered {
            info!("Order {} was already delivered", order_id);
            return Ok(report(order_id, DeliveryStatus::Delivered, Vec::new()));
        }
        warn!("Order {} could not be claimed, it is {}", order_id, status);
        Err(DeliveryError::InProgress { status })
    }

    async fn finish(&self, order_id: &str, status: DeliveryStatus, logs: &[AttemptLog]) -> Result<(), DeliveryError> {
        let snapshot = serde_json::to_string(logs).unwrap_or_else(|_| "[]".to_string());
        if self.db.finish_order(order_id, status, &snapshot).await? {
            info!("Order {} is now {}", order_id, status);
        } else {
            warn!("Order {} left processing concurrently, dropping {} result", order_id, status);
        }
        Ok(())
    }

    async fn record(&self, log: &NewDeliveryLog<'_>) {
        if let Err(e) = self.db.insert_delivery_log(log).await {
            error!("Failed to write delivery log for order {}: {}", log.order_id, e);
        }
    }
}

fn last_error(logs: &[AttemptLog]) -> String {
    logs.iter()
        .rev()
        .find_map(|l| l.error.clone())
        .unwrap_or_else(|| "Delivery failed".to_string())
}

fn report(order_id: &str, status: DeliveryStatus, logs: Vec<AttemptLog>) -> DeliveryReport {
    DeliveryReport {
        order_id: order_id.to_string(),
        success: status == DeliveryStatus::Delivered,
        queued: status == DeliveryStatus::Queued,
        status,
        logs,
    }
}
