// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order notification routing and fan-out.
//!
//! Routing rule: the tenant's company channel is always attempted when
//! configured; additionally exactly one of the branch's B2B or B2C channel
//! is attempted, chosen by the order's customer classification. One
//! destination failing never blocks the others, and a missing channel slot
//! is recorded as "not configured" rather than as a failure.
//!
//! Per-tenant messenger clients are cached by credential so a burst of
//! notifications does not reconnect per call; `clear_cache` supports
//! credential rotation.

pub mod format;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};

use tarjima_core::types::{Branch, ChannelId, Order, OrderStatus, Tenant};
use tarjima_core::{MessengerApi, TarjimaError};

/// Attempts per destination before giving up.
const SEND_ATTEMPTS: u32 = 3;

/// Default pause between retry attempts.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Builds a messenger client for a tenant credential.
///
/// Injected so tests can substitute a mock platform client.
pub type MessengerFactory =
    Arc<dyn Fn(i64, &str) -> Result<Arc<dyn MessengerApi>, TarjimaError> + Send + Sync>;

/// Which routing slot an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSlot {
    Company,
    BranchB2c,
    BranchB2b,
}

/// Delivery result for one destination slot.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub slot: DestinationSlot,
    pub channel: Option<ChannelId>,
    /// False when the slot has no channel configured; that is not a failure.
    pub attempted: bool,
    pub delivered: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    fn not_configured(slot: DestinationSlot) -> Self {
        Self {
            slot,
            channel: None,
            attempted: false,
            delivered: false,
            attempts: 0,
            error: None,
        }
    }
}

/// Aggregated fan-out result for one order event.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub order_id: i64,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn attempted_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.attempted).count()
    }
}

/// Formats and fans out order events to destination channels.
pub struct NotificationRouter {
    factory: MessengerFactory,
    clients: DashMap<String, Arc<dyn MessengerApi>>,
    retry_delay: Duration,
}

impl NotificationRouter {
    pub fn new(factory: MessengerFactory) -> Self {
        Self::with_retry_delay(factory, RETRY_DELAY)
    }

    /// Router with a custom retry pause (tests use zero).
    pub fn with_retry_delay(factory: MessengerFactory, retry_delay: Duration) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
            retry_delay,
        }
    }

    /// Cached messenger client for a tenant, keyed by credential.
    fn client_for(&self, tenant: &Tenant) -> Result<Arc<dyn MessengerApi>, TarjimaError> {
        let token = tenant
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                TarjimaError::Config(format!(
                    "tenant {} has no bot credential configured",
                    tenant.id
                ))
            })?;

        if let Some(client) = self.clients.get(token) {
            return Ok(client.value().clone());
        }

        let client = (self.factory)(tenant.id, token)?;
        self.clients.insert(token.to_string(), client.clone());
        Ok(client)
    }

    /// Drop cached clients. With a credential, only that one; without, all
    /// of them (credential rotation).
    pub fn clear_cache(&self, credential: Option<&str>) {
        match credential {
            Some(token) => {
                self.clients.remove(token);
            }
            None => self.clients.clear(),
        }
    }

    /// Number of cached clients (diagnostics and tests).
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    /// Fan out an order-created event to every implied destination.
    ///
    /// Fails only when the tenant cannot send at all (no credential or the
    /// client cannot be built); per-destination failures land in the report.
    pub async fn notify_order_created(
        &self,
        tenant: &Tenant,
        branch: Option<&Branch>,
        order: &Order,
    ) -> Result<DispatchReport, TarjimaError> {
        let client = self.client_for(tenant)?;
        let message = format::order_created(order, branch.map(|b| b.name.as_str()));

        let mut outcomes = Vec::with_capacity(2);

        // Company channel: always attempted when configured.
        match tenant.company_orders_channel_id.as_ref() {
            Some(channel) => {
                outcomes.push(
                    self.deliver(&client, DestinationSlot::Company, channel, &message)
                        .await,
                );
            }
            None => outcomes.push(DeliveryOutcome::not_configured(DestinationSlot::Company)),
        }

        // Branch channel: exactly one slot, chosen by customer classification.
        let slot = match order.customer_kind {
            tarjima_core::types::CustomerKind::B2c => DestinationSlot::BranchB2c,
            tarjima_core::types::CustomerKind::B2b => DestinationSlot::BranchB2b,
        };
        match branch.and_then(|b| b.channel_for(order.customer_kind)) {
            Some(channel) => {
                outcomes.push(self.deliver(&client, slot, channel, &message).await);
            }
            None => outcomes.push(DeliveryOutcome::not_configured(slot)),
        }

        let report = DispatchReport {
            order_id: order.id,
            outcomes,
        };
        info!(
            order_id = order.id,
            tenant_id = tenant.id,
            attempted = report.attempted_count(),
            delivered = report.delivered_count(),
            "order notification fan-out complete"
        );
        Ok(report)
    }

    /// Deliver a status-change summary to the company channel only.
    pub async fn notify_status_change(
        &self,
        tenant: &Tenant,
        order: &Order,
        old_status: Option<OrderStatus>,
    ) -> Result<DeliveryOutcome, TarjimaError> {
        let client = self.client_for(tenant)?;
        let message = format::status_update(order, old_status);

        let outcome = match tenant.company_orders_channel_id.as_ref() {
            Some(channel) => {
                self.deliver(&client, DestinationSlot::Company, channel, &message)
                    .await
            }
            None => DeliveryOutcome::not_configured(DestinationSlot::Company),
        };

        info!(
            order_id = order.id,
            tenant_id = tenant.id,
            delivered = outcome.delivered,
            "status update dispatched"
        );
        Ok(outcome)
    }

    /// Send with bounded retries. Terminal platform errors short-circuit;
    /// transient ones retry after a short pause.
    async fn deliver(
        &self,
        client: &Arc<dyn MessengerApi>,
        slot: DestinationSlot,
        channel: &ChannelId,
        message: &str,
    ) -> DeliveryOutcome {
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < SEND_ATTEMPTS {
            attempts += 1;
            match client.send_message(channel, message).await {
                Ok(_) => {
                    return DeliveryOutcome {
                        slot,
                        channel: Some(channel.clone()),
                        attempted: true,
                        delivered: true,
                        attempts,
                        error: None,
                    };
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    warn!(
                        channel = %channel,
                        attempt = attempts,
                        retryable,
                        error = %e,
                        "notification send failed"
                    );
                    last_error = Some(e.to_string());
                    if !retryable {
                        break;
                    }
                    if attempts < SEND_ATTEMPTS {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        DeliveryOutcome {
            slot,
            channel: Some(channel.clone()),
            attempted: true,
            delivered: false,
            attempts,
            error: last_error,
        }
    }
}
