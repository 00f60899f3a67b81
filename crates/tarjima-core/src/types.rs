// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common domain types used across the Tarjima workspace.
//!
//! These are the canonical definitions; `tarjima-storage` re-exports them
//! for use at the persistence boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// An external messaging-platform conversation that can receive messages.
///
/// Kept as an opaque string because destination ids come from tenant
/// configuration (channel ids like `-1001234567890`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A platform message id, used to track outbound prompts for later cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(pub i64);

/// One organization owning its own bot credential and destination channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    /// Bot credential. `None` means the tenant has no bot configured and is
    /// skipped by the supervisor.
    pub bot_token: Option<String>,
    /// Company-wide order channel. Always notified when configured.
    pub company_orders_channel_id: Option<ChannelId>,
    pub is_active: bool,
}

impl Tenant {
    /// Whether this tenant can run a bot at all.
    pub fn has_credential(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Credential masked for diagnostic output. Never exposes the full secret.
    pub fn masked_credential(&self) -> Option<String> {
        self.bot_token.as_deref().map(|t| {
            if t.len() <= 10 {
                "***".to_string()
            } else {
                format!("{}...{}", &t[..6], &t[t.len() - 4..])
            }
        })
    }
}

/// A tenant's branch with per-audience destination channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub b2c_orders_channel_id: Option<ChannelId>,
    pub b2b_orders_channel_id: Option<ChannelId>,
    pub is_active: bool,
}

impl Branch {
    /// The branch channel for the given customer classification, if configured.
    pub fn channel_for(&self, kind: CustomerKind) -> Option<&ChannelId> {
        match kind {
            CustomerKind::B2c => self.b2c_orders_channel_id.as_ref(),
            CustomerKind::B2b => self.b2b_orders_channel_id.as_ref(),
        }
    }
}

/// Customer classification driving notification routing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CustomerKind {
    B2c,
    B2b,
}

/// Order lifecycle states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, awaiting payment.
    Pending,
    /// Card payment chosen, waiting for a receipt.
    PaymentPending,
    /// Receipt uploaded.
    PaymentReceived,
    /// Payment verified.
    PaymentConfirmed,
    InProgress,
    Ready,
    Completed,
    Cancelled,
}

/// An order with its money fields.
///
/// `total_price` is derived by the surrounding order system; this core only
/// reads it. All mutations of `extra_fee`, `received`,
/// `payment_accepted_fully`, and `status` go through the payment ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub tenant_id: i64,
    pub branch_id: Option<i64>,
    pub customer_id: String,
    pub customer_kind: CustomerKind,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub extra_fee: Decimal,
    pub received: Decimal,
    pub payment_accepted_fully: bool,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Order {
    /// Everything the customer owes: base price plus extra fees.
    pub fn total_due(&self) -> Decimal {
        self.total_price + self.extra_fee
    }

    /// Outstanding balance. Never negative, and zero once payment has been
    /// accepted in full regardless of the recorded amount.
    pub fn remaining(&self) -> Decimal {
        if self.payment_accepted_fully {
            return Decimal::ZERO;
        }
        (self.total_due() - self.received).max(Decimal::ZERO)
    }

    pub fn is_fully_paid(&self) -> bool {
        self.payment_accepted_fully || self.received >= self.total_due()
    }

    /// Paid share of the total, floored, capped at 100. A zero total reads
    /// as 100 (nothing owed).
    pub fn payment_percentage(&self) -> u32 {
        let total = self.total_due();
        if total <= Decimal::ZERO {
            return 100;
        }
        let pct = (self.received / total * Decimal::from(100))
            .floor()
            .to_u32()
            .unwrap_or(0);
        pct.min(100)
    }
}

/// One end user's in-progress order-wizard state.
///
/// Lives in the shared conversation store so any worker process can pick up
/// the conversation mid-wizard. Must never hold money fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub current_order_id: Option<i64>,
    pub category_id: Option<i64>,
    pub product_id: Option<i64>,
    pub language_id: Option<i64>,
    pub copy_count: u32,
    /// Uploaded file ids, in upload order.
    pub file_ids: Vec<String>,
    /// Outbound prompt message ids, kept for later cleanup.
    pub message_ids: Vec<i64>,
    pub pending_payment_order_id: Option<i64>,
    pub pending_receipt_order_id: Option<i64>,
    /// Free-form extension map for wizard steps that need scratch values.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConversationState {
    pub fn is_empty(&self) -> bool {
        self.current_order_id.is_none()
            && self.category_id.is_none()
            && self.product_id.is_none()
            && self.language_id.is_none()
            && self.copy_count == 0
            && self.file_ids.is_empty()
            && self.message_ids.is_empty()
            && self.pending_payment_order_id.is_none()
            && self.pending_receipt_order_id.is_none()
            && self.extra.is_empty()
    }
}

/// Staff roles for ledger authorization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Staff,
    Manager,
    Owner,
}

impl StaffRole {
    /// Forcing acceptance of an underpaid order is restricted.
    pub fn can_force_accept(&self) -> bool {
        matches!(self, Self::Manager | Self::Owner)
    }

    /// Resetting recorded payments is restricted.
    pub fn can_reset_payment(&self) -> bool {
        matches!(self, Self::Manager | Self::Owner)
    }
}

/// A platform update routed to a tenant runtime, already reduced to the
/// fields the wizard cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundUpdate {
    pub update_id: i64,
    pub tenant_id: i64,
    pub chat_id: i64,
    pub sender_id: String,
    pub message_id: Option<i64>,
    pub kind: UpdateKind,
}

/// The payload of an inbound update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UpdateKind {
    /// A plain text message (including commands like `/start`).
    Text(String),
    /// An inline-keyboard callback payload.
    Callback(String),
    /// An uploaded document.
    Document {
        file_id: String,
        file_name: Option<String>,
    },
}

/// Webhook registration status as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookStatus {
    pub url: Option<String>,
    pub pending_update_count: u32,
    pub last_error_message: Option<String>,
}
