// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment ledger: the sole authority for mutating an order's money fields.
//!
//! Every mutation runs inside a `BEGIN IMMEDIATE` transaction on the
//! single-writer connection, so concurrent calls on the same order are
//! totally ordered and each caller observes the fully-applied effect of all
//! prior calls. The lock is held only for the row mutation itself and never
//! across a call to the messaging platform.

use std::sync::Arc;

use rusqlite::{params, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use tarjima_core::types::{Order, OrderStatus, StaffRole};
use tarjima_core::TarjimaError;
use tarjima_storage::database::map_tr_err;
use tarjima_storage::queries::orders::{order_from_row, ORDER_COLUMNS};
use tarjima_storage::Database;

/// Errors from payment mutations.
///
/// `OrderNotFound` is deliberately distinct from `Validation`: callers show
/// different messages for a bad request versus a vanished order.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The request is malformed or not allowed in the order's current state.
    #[error("payment validation failed: {0}")]
    Validation(String),

    /// The acting role is not allowed to perform this mutation.
    #[error("not permitted: {0}")]
    Forbidden(String),

    /// No such order.
    #[error("order {0} not found")]
    OrderNotFound(i64),

    /// Underlying storage failure.
    #[error(transparent)]
    Storage(#[from] TarjimaError),
}

/// One payment mutation request.
#[derive(Debug, Clone, Default)]
pub struct PaymentRequest {
    /// Amount received now; added to the running total.
    pub amount: Option<Decimal>,
    /// Extra fee to add to the total due.
    pub extra_fee: Option<Decimal>,
    /// Mark the order as paid in full.
    pub accept_fully: bool,
    /// Allow `accept_fully` on an underpaid order (elevated roles only).
    pub force_accept: bool,
}

impl PaymentRequest {
    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn accept() -> Self {
        Self {
            accept_fully: true,
            ..Self::default()
        }
    }
}

/// Who is performing the mutation; drives the role checks.
#[derive(Debug, Clone)]
pub struct PaymentActor {
    pub name: String,
    pub role: StaffRole,
}

impl PaymentActor {
    pub fn new(name: impl Into<String>, role: StaffRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Result of a successful mutation, reflecting the committed row.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub order_id: i64,
    pub received: Decimal,
    pub remaining: Decimal,
    pub total_due: Decimal,
    pub extra_fee: Decimal,
    pub is_fully_paid: bool,
    pub payment_accepted_fully: bool,
    pub status: OrderStatus,
    /// Status before this mutation; lets callers fan out status-change
    /// notifications without re-reading the row.
    pub previous_status: OrderStatus,
    /// Paid share of the total, capped at 100.
    pub payment_percentage: u32,
}

impl PaymentOutcome {
    fn from_order(order: &Order, previous_status: OrderStatus) -> Self {
        Self {
            order_id: order.id,
            received: order.received,
            remaining: order.remaining(),
            total_due: order.total_due(),
            extra_fee: order.extra_fee,
            is_fully_paid: order.is_fully_paid(),
            payment_accepted_fully: order.payment_accepted_fully,
            status: order.status,
            previous_status,
            payment_percentage: order.payment_percentage(),
        }
    }

    /// Whether this mutation moved the order to a new status.
    pub fn status_changed(&self) -> bool {
        self.status != self.previous_status
    }
}

/// Serializes money mutations on orders.
pub struct PaymentLedger {
    db: Arc<Database>,
}

impl PaymentLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record a payment, extra fee, or full acceptance on one order.
    ///
    /// All-or-nothing: a validation failure leaves the order untouched.
    /// Forcing acceptance of an underpaid order raises `received` to the
    /// total due so the stored figures stay consistent; see DESIGN.md for
    /// the reconciliation note.
    pub async fn record_payment(
        &self,
        order_id: i64,
        request: PaymentRequest,
        actor: PaymentActor,
    ) -> Result<PaymentOutcome, PaymentError> {
        validate_request(&request, &actor)?;

        let req = request.clone();
        let result = self
            .db
            .connection()
            .call(
                move |conn| -> Result<Result<PaymentOutcome, PaymentError>, tokio_rusqlite::Error> {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                    let order = {
                        let mut stmt = tx.prepare(&format!(
                            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
                        ))?;
                        match stmt.query_row(params![order_id], order_from_row) {
                            Ok(order) => order,
                            Err(rusqlite::Error::QueryReturnedNoRows) => {
                                return Ok(Err(PaymentError::OrderNotFound(order_id)));
                            }
                            Err(e) => return Err(e.into()),
                        }
                    };

                    let previous_status = order.status;
                    let updated = match apply_payment(order, &req) {
                        Ok(updated) => updated,
                        Err(e) => return Ok(Err(e)),
                    };

                    tx.execute(
                        "UPDATE orders SET
                             received = ?2, extra_fee = ?3,
                             payment_accepted_fully = ?4, status = ?5,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![
                            order_id,
                            updated.received.to_string(),
                            updated.extra_fee.to_string(),
                            updated.payment_accepted_fully,
                            updated.status.to_string(),
                        ],
                    )?;
                    tx.commit()?;

                    Ok(Ok(PaymentOutcome::from_order(&updated, previous_status)))
                },
            )
            .await
            .map_err(|e| PaymentError::Storage(map_tr_err(e)))?;

        let outcome = result?;
        info!(
            order_id,
            actor = actor.name.as_str(),
            received = %outcome.received,
            remaining = %outcome.remaining,
            status = %outcome.status,
            "payment recorded"
        );
        Ok(outcome)
    }

    /// Zero the recorded payments and revert the order to its initial status.
    ///
    /// Restricted to elevated roles; runs under the same locking as
    /// `record_payment`.
    pub async fn reset_payment(
        &self,
        order_id: i64,
        actor: PaymentActor,
    ) -> Result<PaymentOutcome, PaymentError> {
        if !actor.role.can_reset_payment() {
            return Err(PaymentError::Forbidden(format!(
                "role `{}` may not reset payments",
                actor.role
            )));
        }

        let result = self
            .db
            .connection()
            .call(
                move |conn| -> Result<Result<PaymentOutcome, PaymentError>, tokio_rusqlite::Error> {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                    let order = {
                        let mut stmt = tx.prepare(&format!(
                            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
                        ))?;
                        match stmt.query_row(params![order_id], order_from_row) {
                            Ok(order) => order,
                            Err(rusqlite::Error::QueryReturnedNoRows) => {
                                return Ok(Err(PaymentError::OrderNotFound(order_id)));
                            }
                            Err(e) => return Err(e.into()),
                        }
                    };

                    tx.execute(
                        "UPDATE orders SET
                             received = '0', payment_accepted_fully = 0, status = 'pending',
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![order_id],
                    )?;
                    tx.commit()?;

                    let previous_status = order.status;
                    let updated = Order {
                        received: Decimal::ZERO,
                        payment_accepted_fully: false,
                        status: OrderStatus::Pending,
                        ..order
                    };
                    Ok(Ok(PaymentOutcome::from_order(&updated, previous_status)))
                },
            )
            .await
            .map_err(|e| PaymentError::Storage(map_tr_err(e)))?;

        let outcome = result?;
        info!(
            order_id,
            actor = actor.name.as_str(),
            "payment reset"
        );
        Ok(outcome)
    }
}

/// Upfront request validation. Nothing is read or written before this passes.
fn validate_request(request: &PaymentRequest, actor: &PaymentActor) -> Result<(), PaymentError> {
    if let Some(amount) = request.amount
        && amount < Decimal::ZERO
    {
        return Err(PaymentError::Validation(format!(
            "payment amount cannot be negative, got {amount}"
        )));
    }

    if let Some(fee) = request.extra_fee
        && fee <= Decimal::ZERO
    {
        return Err(PaymentError::Validation(format!(
            "extra fee must be positive, got {fee}"
        )));
    }

    if request.amount.is_none() && request.extra_fee.is_none() && !request.accept_fully {
        return Err(PaymentError::Validation(
            "nothing to apply: pass an amount, an extra fee, or accept_fully".into(),
        ));
    }

    if request.force_accept && !request.accept_fully {
        return Err(PaymentError::Validation(
            "force_accept is only meaningful together with accept_fully".into(),
        ));
    }

    if request.force_accept && !actor.role.can_force_accept() {
        return Err(PaymentError::Forbidden(format!(
            "role `{}` may not force acceptance of an underpaid order",
            actor.role
        )));
    }

    Ok(())
}

/// Pure application of a validated request to an order row.
fn apply_payment(mut order: Order, request: &PaymentRequest) -> Result<Order, PaymentError> {
    if let Some(amount) = request.amount {
        order.received += amount;
    }
    if let Some(fee) = request.extra_fee {
        order.extra_fee += fee;
    }

    if request.accept_fully {
        let total_due = order.total_due();
        if order.received < total_due {
            if !request.force_accept {
                return Err(PaymentError::Validation(format!(
                    "received {} is below total due {}; pass force_accept to override",
                    order.received, total_due
                )));
            }
            // Reconciliation: the stored total must match the accepted state.
            order.received = total_due;
        }
        order.payment_accepted_fully = true;
    }

    if order.is_fully_paid()
        && matches!(
            order.status,
            OrderStatus::Pending | OrderStatus::PaymentPending | OrderStatus::PaymentReceived
        )
    {
        order.status = OrderStatus::PaymentConfirmed;
    }

    Ok(order)
}
