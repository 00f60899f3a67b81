// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTML formatting of order summaries for destination channels.

use tarjima_core::types::{CustomerKind, Order, OrderStatus};

fn kind_label(kind: CustomerKind) -> &'static str {
    match kind {
        CustomerKind::B2c => "B2C",
        CustomerKind::B2b => "B2B",
    }
}

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Pending",
        OrderStatus::PaymentPending => "Payment pending",
        OrderStatus::PaymentReceived => "Payment received",
        OrderStatus::PaymentConfirmed => "Payment confirmed",
        OrderStatus::InProgress => "In progress",
        OrderStatus::Ready => "Ready",
        OrderStatus::Completed => "Completed",
        OrderStatus::Cancelled => "Cancelled",
    }
}

/// Summary sent to every destination when an order is created.
pub fn order_created(order: &Order, branch_name: Option<&str>) -> String {
    let mut message = format!(
        "<b>New Order #{}</b>\n{} | {}\n\n<b>Customer:</b> {}\n<b>Branch:</b> {}\n",
        order.id,
        kind_label(order.customer_kind),
        status_label(order.status),
        order.customer_id,
        branch_name.unwrap_or("-"),
    );

    message.push_str(&format!(
        "<b>Total due:</b> {}\n<b>Received:</b> {}\n",
        order.total_due(),
        order.received,
    ));

    if let Some(description) = order.description.as_deref() {
        let short: String = description.chars().take(200).collect();
        message.push_str(&format!("<b>Notes:</b> {short}\n"));
    }

    message.push_str(&format!("\n<i>Created: {}</i>", order.created_at));
    message
}

/// Summary sent to the company channel on a status change.
pub fn status_update(order: &Order, old_status: Option<OrderStatus>) -> String {
    let mut message = format!(
        "<b>Order #{} Status Update</b>\n\n<b>New status:</b> {}\n",
        order.id,
        status_label(order.status),
    );
    if let Some(old) = old_status {
        message.push_str(&format!("<i>Previous: {}</i>\n", status_label(old)));
    }
    message.push_str(&format!("<b>Customer:</b> {}\n", order.customer_id));
    message
}
