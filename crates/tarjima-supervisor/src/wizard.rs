// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The order-wizard update handler driven by each tenant runtime.
//!
//! Every piece of wizard progress goes through the shared conversation
//! store, so the next message can be served by any worker process. Order
//! finalization creates the order row, fans out notifications, and clears
//! the wizard; payment confirmations go through the ledger. End users never
//! see internal errors, only a generic retry prompt.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use tarjima_core::types::{ChannelId, CustomerKind, InboundUpdate, Tenant, UpdateKind};
use tarjima_core::{MessengerApi, TarjimaError, UpdateHandler};
use tarjima_dispatch::NotificationRouter;
use tarjima_ledger::{PaymentActor, PaymentError, PaymentLedger, PaymentRequest};
use tarjima_registry::TenantRegistry;
use tarjima_state::{user_key, ConversationStore};
use tarjima_storage::queries::orders;
use tarjima_storage::Database;

const WELCOME: &str = "Welcome! Send your documents and use the menu to place a translation order.";
const RETRY_PROMPT: &str = "Something went wrong, please try again.";

/// Name the ledger records for customer-confirmed payments.
const BOT_ACTOR: &str = "bot";

/// Wizard state machine over the shared conversation store.
pub struct WizardHandler {
    tenant: Tenant,
    messenger: Arc<dyn MessengerApi>,
    store: Arc<ConversationStore>,
    ledger: Arc<PaymentLedger>,
    router: Arc<NotificationRouter>,
    registry: Arc<TenantRegistry>,
    db: Arc<Database>,
}

impl WizardHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant: Tenant,
        messenger: Arc<dyn MessengerApi>,
        store: Arc<ConversationStore>,
        ledger: Arc<PaymentLedger>,
        router: Arc<NotificationRouter>,
        registry: Arc<TenantRegistry>,
        db: Arc<Database>,
    ) -> Self {
        Self {
            tenant,
            messenger,
            store,
            ledger,
            router,
            registry,
            db,
        }
    }

    /// Send a reply and track its message id for later cleanup. Send
    /// failures are logged, never surfaced to the loop.
    async fn reply(&self, key: &str, chat_id: i64, text: &str) {
        let channel = ChannelId(chat_id.to_string());
        match self.messenger.send_message(&channel, text).await {
            Ok(message) => {
                if let Err(e) = self.store.add_message_id(key, message.0).await {
                    warn!(key, error = %e, "failed to track outbound message id");
                }
            }
            Err(e) => {
                warn!(chat_id, error = %e, "failed to send wizard reply");
            }
        }
    }

    async fn handle_callback(
        &self,
        key: &str,
        update: &InboundUpdate,
        data: &str,
    ) -> Result<(), TarjimaError> {
        let (action, rest) = data.split_once(':').unwrap_or((data, ""));

        match action {
            "category" => {
                self.store.set_category(key, rest.parse().ok()).await?;
                self.reply(key, update.chat_id, "Category saved. Now pick a document type.")
                    .await;
            }
            "product" => {
                self.store.set_product(key, rest.parse().ok()).await?;
                self.reply(key, update.chat_id, "Document type saved. Pick a language.")
                    .await;
            }
            "language" => {
                self.store.set_language(key, rest.parse().ok()).await?;
                self.reply(key, update.chat_id, "Language saved. Upload your files.")
                    .await;
            }
            "copies" => {
                let count = rest.parse().unwrap_or(0);
                self.store.set_copy_count(key, count).await?;
                self.reply(key, update.chat_id, "Copy count saved.").await;
            }
            "branch" => {
                self.store
                    .set_extra(key, "branch_id", serde_json::json!(rest.parse::<i64>().ok()))
                    .await?;
                self.reply(key, update.chat_id, "Branch saved.").await;
            }
            "quote" => {
                // Quoted price computed by the product catalog; carried in
                // the extension map until finalization.
                self.store
                    .set_extra(key, "quoted_price", serde_json::json!(rest))
                    .await?;
            }
            "agency" => {
                self.store
                    .set_extra(key, "customer_kind", serde_json::json!("b2b"))
                    .await?;
                self.reply(key, update.chat_id, "Marked as an agency order.").await;
            }
            "confirm" => {
                self.finalize_order(key, update).await?;
            }
            "paid" => {
                self.record_customer_payment(key, update, rest).await?;
            }
            _ => {
                warn!(tenant_id = self.tenant.id, action, "unknown wizard callback");
            }
        }
        Ok(())
    }

    /// Create the order from the collected wizard state, fan out the
    /// creation event, and reset the wizard.
    async fn finalize_order(&self, key: &str, update: &InboundUpdate) -> Result<(), TarjimaError> {
        let state = self.store.get(key).await?;

        if state.product_id.is_none() {
            self.reply(key, update.chat_id, "Pick a document type before confirming.")
                .await;
            return Ok(());
        }

        let total_price = state
            .extra
            .get("quoted_price")
            .and_then(|v| v.as_str())
            .and_then(|raw| Decimal::from_str(raw).ok())
            .unwrap_or(Decimal::ZERO);
        let branch_id = state.extra.get("branch_id").and_then(|v| v.as_i64());
        let customer_kind = match state.extra.get("customer_kind").and_then(|v| v.as_str()) {
            Some("b2b") => CustomerKind::B2b,
            _ => CustomerKind::B2c,
        };

        let order_id = orders::create(
            &self.db,
            orders::NewOrder {
                tenant_id: self.tenant.id,
                branch_id,
                customer_id: update.sender_id.clone(),
                customer_kind,
                total_price,
                description: None,
            },
        )
        .await?;

        let order = orders::get(&self.db, order_id)
            .await?
            .ok_or_else(|| TarjimaError::Internal(format!("order {order_id} vanished")))?;

        info!(
            tenant_id = self.tenant.id,
            order_id,
            customer = update.sender_id.as_str(),
            "order finalized from wizard"
        );

        // Fan-out failures are operator concerns; the customer flow goes on.
        let branch = match branch_id {
            Some(id) => self.registry.branch(id).await?,
            None => None,
        };
        if let Err(e) = self
            .router
            .notify_order_created(&self.tenant, branch.as_ref(), &order)
            .await
        {
            warn!(order_id, error = %e, "order notification fan-out failed");
        }

        // Wizard done: reset selections, then point the conversation at the
        // freshly created order awaiting payment.
        self.store.clear(key).await?;
        self.store.set_current_order(key, Some(order_id)).await?;
        self.store
            .set_pending_payment_order(key, Some(order_id))
            .await?;

        self.reply(
            key,
            update.chat_id,
            &format!(
                "Order #{order_id} created. Amount due: {}.",
                order.remaining()
            ),
        )
        .await;
        Ok(())
    }

    /// Status-change fan-out to the company channel. Best effort: failures
    /// are an operator concern, never the customer's.
    async fn announce_status_change(
        &self,
        order_id: i64,
        old_status: tarjima_core::types::OrderStatus,
    ) {
        let order = match orders::get(&self.db, order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return,
            Err(e) => {
                warn!(order_id, error = %e, "cannot load order for status update");
                return;
            }
        };
        if let Err(e) = self
            .router
            .notify_status_change(&self.tenant, &order, Some(old_status))
            .await
        {
            warn!(order_id, error = %e, "status update dispatch failed");
        }
    }

    /// `paid:<order_id>:<amount>` from the customer's payment keyboard.
    async fn record_customer_payment(
        &self,
        key: &str,
        update: &InboundUpdate,
        rest: &str,
    ) -> Result<(), TarjimaError> {
        let Some((order_raw, amount_raw)) = rest.split_once(':') else {
            self.reply(key, update.chat_id, RETRY_PROMPT).await;
            return Ok(());
        };
        let (Ok(order_id), Ok(amount)) =
            (order_raw.parse::<i64>(), Decimal::from_str(amount_raw))
        else {
            self.reply(key, update.chat_id, RETRY_PROMPT).await;
            return Ok(());
        };

        let outcome = self
            .ledger
            .record_payment(
                order_id,
                PaymentRequest::amount(amount),
                PaymentActor::new(BOT_ACTOR, tarjima_core::types::StaffRole::Staff),
            )
            .await;

        match outcome {
            Ok(outcome) => {
                let text = if outcome.is_fully_paid {
                    format!("Payment received in full for order #{order_id}. Thank you!")
                } else {
                    format!(
                        "Payment recorded for order #{order_id}. Remaining: {}.",
                        outcome.remaining
                    )
                };
                if outcome.is_fully_paid {
                    self.store.set_pending_payment_order(key, None).await?;
                }
                if outcome.status_changed() {
                    self.announce_status_change(order_id, outcome.previous_status)
                        .await;
                }
                self.reply(key, update.chat_id, &text).await;
            }
            Err(e) => {
                // Typed ledger errors stay internal; the user only gets a
                // retry prompt.
                match &e {
                    PaymentError::Storage(_) => {
                        warn!(order_id, error = %e, "payment storage failure")
                    }
                    _ => info!(order_id, error = %e, "customer payment rejected"),
                }
                self.reply(key, update.chat_id, RETRY_PROMPT).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateHandler for WizardHandler {
    async fn handle(&self, update: InboundUpdate) -> Result<(), TarjimaError> {
        let key = user_key(self.tenant.id, &update.sender_id);

        match &update.kind {
            UpdateKind::Text(text) => match text.trim() {
                "/start" => {
                    self.store.clear(&key).await?;
                    self.reply(&key, update.chat_id, WELCOME).await;
                }
                "/cancel" => {
                    self.store.clear(&key).await?;
                    self.reply(&key, update.chat_id, "Order cancelled.").await;
                }
                _ => {
                    self.reply(
                        &key,
                        update.chat_id,
                        "Use the menu buttons, or /start to begin a new order.",
                    )
                    .await;
                }
            },
            UpdateKind::Callback(data) => {
                self.handle_callback(&key, &update, data).await?;
            }
            UpdateKind::Document { file_id, .. } => {
                self.store.add_file_id(&key, file_id).await?;
                let count = self.store.get(&key).await?.file_ids.len();
                self.reply(
                    &key,
                    update.chat_id,
                    &format!("File received ({count} total). Press confirm when done."),
                )
                .await;
            }
        }
        Ok(())
    }
}
