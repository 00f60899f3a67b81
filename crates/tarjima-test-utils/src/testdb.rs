// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp database seeded with a standard tenant layout.

use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::TempDir;

use tarjima_core::types::{Branch, ChannelId, CustomerKind, Tenant};
use tarjima_storage::queries::{orders, tenants};
use tarjima_storage::Database;

/// An isolated database for one test, dropped with its temp directory.
///
/// The standard layout: tenant 1 ("Test Center", credential configured,
/// company channel `-100500`) with branch 2 ("Main", B2C `-100111`,
/// B2B `-100222`).
pub struct TestDb {
    pub db: Arc<Database>,
    /// Keeps the temp directory alive for the test's duration.
    _dir: TempDir,
}

impl TestDb {
    /// Open an empty migrated database.
    pub async fn empty() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let db = Arc::new(
            Database::open(path.to_str().expect("utf-8 path"))
                .await
                .expect("open test db"),
        );
        Self { db, _dir: dir }
    }

    /// Open a database seeded with the standard tenant and branch.
    pub async fn seeded() -> Self {
        let this = Self::empty().await;
        tenants::upsert(&this.db, &Self::tenant()).await.expect("seed tenant");
        tenants::upsert_branch(&this.db, &Self::branch())
            .await
            .expect("seed branch");
        this
    }

    /// The standard seeded tenant.
    pub fn tenant() -> Tenant {
        Tenant {
            id: 1,
            name: "Test Center".into(),
            bot_token: Some("100001:test-token".into()),
            company_orders_channel_id: Some(ChannelId("-100500".into())),
            is_active: true,
        }
    }

    /// The standard seeded branch.
    pub fn branch() -> Branch {
        Branch {
            id: 2,
            tenant_id: 1,
            name: "Main".into(),
            b2c_orders_channel_id: Some(ChannelId("-100111".into())),
            b2b_orders_channel_id: Some(ChannelId("-100222".into())),
            is_active: true,
        }
    }

    /// Create an order for the seeded tenant. Returns its id.
    pub async fn create_order(&self, total: Decimal, kind: CustomerKind) -> i64 {
        orders::create(
            &self.db,
            orders::NewOrder {
                tenant_id: 1,
                branch_id: Some(2),
                customer_id: "123456789".into(),
                customer_kind: kind,
                total_price: total,
                description: None,
            },
        )
        .await
        .expect("create order")
    }
}
