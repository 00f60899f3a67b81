// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order read/create operations.
//!
//! Money mutations are deliberately absent here: `tarjima-ledger` owns them
//! and runs its own statements inside an immediate transaction. This module
//! exposes the shared row mapping so the ledger reads rows the same way.

use std::str::FromStr;

use rusqlite::params;
use rust_decimal::Decimal;

use crate::database::Database;
use crate::models::{CustomerKind, Order, OrderStatus};

/// Fields the wizard provides when finalizing a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub tenant_id: i64,
    pub branch_id: Option<i64>,
    pub customer_id: String,
    pub customer_kind: CustomerKind,
    pub total_price: Decimal,
    pub description: Option<String>,
}

/// Column list matching [`order_from_row`].
pub const ORDER_COLUMNS: &str = "id, tenant_id, branch_id, customer_id, customer_kind, status, \
     total_price, extra_fee, received, payment_accepted_fully, description, \
     created_at, updated_at";

/// Map one `orders` row into an [`Order`].
///
/// Decimal columns are TEXT; a corrupt value surfaces as a conversion error
/// rather than silently reading as zero.
pub fn order_from_row(row: &rusqlite::Row<'_>) -> Result<Order, rusqlite::Error> {
    let kind: String = row.get(4)?;
    let status: String = row.get(5)?;
    let total_price: String = row.get(6)?;
    let extra_fee: String = row.get(7)?;
    let received: String = row.get(8)?;

    let parse_decimal = |idx: usize, value: &str| {
        Decimal::from_str(value).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };

    Ok(Order {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        branch_id: row.get(2)?,
        customer_id: row.get(3)?,
        customer_kind: CustomerKind::from_str(&kind).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        status: OrderStatus::from_str(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?,
        total_price: parse_decimal(6, &total_price)?,
        extra_fee: parse_decimal(7, &extra_fee)?,
        received: parse_decimal(8, &received)?,
        payment_accepted_fully: row.get(9)?,
        description: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Create a new pending order. Returns the generated order id.
pub async fn create(db: &Database, new: NewOrder) -> Result<i64, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<i64, tokio_rusqlite::Error> {
            conn.execute(
                "INSERT INTO orders
                 (tenant_id, branch_id, customer_id, customer_kind, status,
                  total_price, description)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6)",
                params![
                    new.tenant_id,
                    new.branch_id,
                    new.customer_id,
                    new.customer_kind.to_string(),
                    new.total_price.to_string(),
                    new.description,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get one order by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<Order>, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<Option<Order>, tokio_rusqlite::Error> {
            let mut stmt =
                conn.prepare(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"))?;
            match stmt.query_row(params![id], order_from_row) {
                Ok(order) => Ok(Some(order)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List a tenant's orders, newest first (diagnostics and tests).
pub async fn list_for_tenant(
    db: &Database,
    tenant_id: i64,
) -> Result<Vec<Order>, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Order>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = ?1 ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map(params![tenant_id], order_from_row)?;
            let mut orders = Vec::new();
            for row in rows {
                orders.push(row?);
            }
            Ok(orders)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
