// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant and branch read operations.
//!
//! Tenant provisioning is owned by the surrounding management system; the
//! bot core only reads here. The insert helpers exist for that system's
//! provisioning path and for test seeding.

use rusqlite::params;
use tarjima_core::types::ChannelId;

use crate::database::Database;
use crate::models::{Branch, Tenant};

fn tenant_from_row(row: &rusqlite::Row<'_>) -> Result<Tenant, rusqlite::Error> {
    let channel: Option<String> = row.get(3)?;
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        bot_token: row.get(2)?,
        company_orders_channel_id: channel.map(ChannelId),
        is_active: row.get(4)?,
    })
}

fn branch_from_row(row: &rusqlite::Row<'_>) -> Result<Branch, rusqlite::Error> {
    let b2c: Option<String> = row.get(3)?;
    let b2b: Option<String> = row.get(4)?;
    Ok(Branch {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        b2c_orders_channel_id: b2c.map(ChannelId),
        b2b_orders_channel_id: b2b.map(ChannelId),
        is_active: row.get(5)?,
    })
}

const TENANT_COLUMNS: &str =
    "id, name, bot_token, company_orders_channel_id, is_active";
const BRANCH_COLUMNS: &str =
    "id, tenant_id, name, b2c_orders_channel_id, b2b_orders_channel_id, is_active";

/// List every tenant, active or not (diagnostic listing).
pub async fn list_all(db: &Database) -> Result<Vec<Tenant>, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Tenant>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY id"
            ))?;
            let rows = stmt.query_map([], tenant_from_row)?;
            let mut tenants = Vec::new();
            for row in rows {
                tenants.push(row?);
            }
            Ok(tenants)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List active tenants only.
pub async fn list_active(db: &Database) -> Result<Vec<Tenant>, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Tenant>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TENANT_COLUMNS} FROM tenants WHERE is_active = 1 ORDER BY id"
            ))?;
            let rows = stmt.query_map([], tenant_from_row)?;
            let mut tenants = Vec::new();
            for row in rows {
                tenants.push(row?);
            }
            Ok(tenants)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get one tenant by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<Tenant>, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<Option<Tenant>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], tenant_from_row) {
                Ok(tenant) => Ok(Some(tenant)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List a tenant's active branches.
pub async fn branches_for(
    db: &Database,
    tenant_id: i64,
) -> Result<Vec<Branch>, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Branch>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BRANCH_COLUMNS} FROM branches
                 WHERE tenant_id = ?1 AND is_active = 1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![tenant_id], branch_from_row)?;
            let mut branches = Vec::new();
            for row in rows {
                branches.push(row?);
            }
            Ok(branches)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get one branch by id.
pub async fn get_branch(
    db: &Database,
    branch_id: i64,
) -> Result<Option<Branch>, tarjima_core::TarjimaError> {
    db.connection()
        .call(move |conn| -> Result<Option<Branch>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1"
            ))?;
            match stmt.query_row(params![branch_id], branch_from_row) {
                Ok(branch) => Ok(Some(branch)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or replace a tenant row (provisioning / test seeding).
pub async fn upsert(db: &Database, tenant: &Tenant) -> Result<(), tarjima_core::TarjimaError> {
    let tenant = tenant.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT OR REPLACE INTO tenants
                 (id, name, bot_token, company_orders_channel_id, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tenant.id,
                    tenant.name,
                    tenant.bot_token,
                    tenant.company_orders_channel_id.map(|c| c.0),
                    tenant.is_active,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or replace a branch row (provisioning / test seeding).
pub async fn upsert_branch(
    db: &Database,
    branch: &Branch,
) -> Result<(), tarjima_core::TarjimaError> {
    let branch = branch.clone();
    db.connection()
        .call(move |conn| -> Result<(), tokio_rusqlite::Error> {
            conn.execute(
                "INSERT OR REPLACE INTO branches
                 (id, tenant_id, name, b2c_orders_channel_id, b2b_orders_channel_id, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    branch.id,
                    branch.tenant_id,
                    branch.name,
                    branch.b2c_orders_channel_id.map(|c| c.0),
                    branch.b2b_orders_channel_id.map(|c| c.0),
                    branch.is_active,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
