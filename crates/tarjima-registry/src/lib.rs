// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only tenant registry.
//!
//! Tenant provisioning belongs to the surrounding management system; the bot
//! core only ever reads tenants and their branch destination channels. The
//! diagnostic listing masks credentials, so `--list` output and logs never
//! leak a full bot token.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use tarjima_core::types::{Branch, Tenant};
use tarjima_core::TarjimaError;
use tarjima_storage::queries::tenants;
use tarjima_storage::Database;

/// Diagnostic view of one tenant, safe to print.
#[derive(Debug, Clone, Serialize)]
pub struct TenantOverview {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub credential_configured: bool,
    /// Masked credential (`123456...ab12`), or `None` when unconfigured.
    pub credential: Option<String>,
    pub company_channel_configured: bool,
    pub branches: Vec<BranchOverview>,
}

/// Diagnostic view of one branch's channel configuration.
#[derive(Debug, Clone, Serialize)]
pub struct BranchOverview {
    pub id: i64,
    pub name: String,
    pub b2c_channel_configured: bool,
    pub b2b_channel_configured: bool,
}

/// Read-only access to active tenants and their destination channels.
pub struct TenantRegistry {
    db: Arc<Database>,
}

impl TenantRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Active tenants that can actually run a bot. Tenants without a
    /// credential are skipped with a warning rather than an error, so one
    /// half-provisioned tenant never blocks the rest.
    pub async fn active_with_bots(&self) -> Result<Vec<Tenant>, TarjimaError> {
        let tenants = tenants::list_active(&self.db).await?;
        let mut runnable = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            if tenant.has_credential() {
                runnable.push(tenant);
            } else {
                warn!(
                    tenant_id = tenant.id,
                    tenant_name = tenant.name.as_str(),
                    "tenant has no bot credential configured, skipping"
                );
            }
        }
        Ok(runnable)
    }

    /// One active tenant by id, with its credential.
    pub async fn get_active(&self, tenant_id: i64) -> Result<Tenant, TarjimaError> {
        match tenants::get(&self.db, tenant_id).await? {
            Some(tenant) if tenant.is_active => Ok(tenant),
            _ => Err(TarjimaError::TenantNotFound { tenant_id }),
        }
    }

    /// A tenant's active branches with their destination channels.
    pub async fn branches(&self, tenant_id: i64) -> Result<Vec<Branch>, TarjimaError> {
        tenants::branches_for(&self.db, tenant_id).await
    }

    /// One branch by id.
    pub async fn branch(&self, branch_id: i64) -> Result<Option<Branch>, TarjimaError> {
        tenants::get_branch(&self.db, branch_id).await
    }

    /// Diagnostic listing of every tenant, secrets masked.
    pub async fn list_overview(&self) -> Result<Vec<TenantOverview>, TarjimaError> {
        let all = tenants::list_all(&self.db).await?;
        let mut overviews = Vec::with_capacity(all.len());
        for tenant in all {
            let branches = tenants::branches_for(&self.db, tenant.id).await?;
            overviews.push(TenantOverview {
                id: tenant.id,
                name: tenant.name.clone(),
                is_active: tenant.is_active,
                credential_configured: tenant.has_credential(),
                credential: tenant.masked_credential(),
                company_channel_configured: tenant.company_orders_channel_id.is_some(),
                branches: branches
                    .into_iter()
                    .map(|b| BranchOverview {
                        id: b.id,
                        name: b.name,
                        b2c_channel_configured: b.b2c_orders_channel_id.is_some(),
                        b2b_channel_configured: b.b2b_orders_channel_id.is_some(),
                    })
                    .collect(),
            });
        }
        Ok(overviews)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarjima_core::types::ChannelId;
    use tempfile::tempdir;

    async fn setup() -> (TenantRegistry, Arc<Database>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("registry.db");
        let db = Arc::new(Database::open(db_path.to_str().unwrap()).await.unwrap());
        (TenantRegistry::new(db.clone()), db, dir)
    }

    fn tenant(id: i64, token: Option<&str>, active: bool) -> Tenant {
        Tenant {
            id,
            name: format!("Center {id}"),
            bot_token: token.map(String::from),
            company_orders_channel_id: Some(ChannelId("-100500".into())),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn active_with_bots_skips_credential_less_tenants() {
        let (registry, db, _dir) = setup().await;
        tarjima_storage::queries::tenants::upsert(&db, &tenant(1, Some("100001:a"), true))
            .await
            .unwrap();
        tarjima_storage::queries::tenants::upsert(&db, &tenant(2, None, true))
            .await
            .unwrap();
        tarjima_storage::queries::tenants::upsert(&db, &tenant(3, Some("100003:c"), false))
            .await
            .unwrap();

        let runnable = registry.active_with_bots().await.unwrap();
        assert_eq!(runnable.len(), 1);
        assert_eq!(runnable[0].id, 1);
    }

    #[tokio::test]
    async fn get_active_rejects_inactive_and_missing() {
        let (registry, db, _dir) = setup().await;
        tarjima_storage::queries::tenants::upsert(&db, &tenant(1, Some("100001:a"), false))
            .await
            .unwrap();

        assert!(matches!(
            registry.get_active(1).await.unwrap_err(),
            TarjimaError::TenantNotFound { tenant_id: 1 }
        ));
        assert!(matches!(
            registry.get_active(9).await.unwrap_err(),
            TarjimaError::TenantNotFound { tenant_id: 9 }
        ));
    }

    #[tokio::test]
    async fn overview_masks_credentials() {
        let (registry, db, _dir) = setup().await;
        tarjima_storage::queries::tenants::upsert(
            &db,
            &tenant(1, Some("123456789:AAAA-secret-tail"), true),
        )
        .await
        .unwrap();

        let overview = registry.list_overview().await.unwrap();
        assert_eq!(overview.len(), 1);
        let entry = &overview[0];
        assert!(entry.credential_configured);
        let masked = entry.credential.as_deref().unwrap();
        assert!(!masked.contains("secret"));
        assert!(entry.company_channel_configured);
    }
}
