// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-process conversation state store.
//!
//! Every bot runtime, whether a task in the supervisor process or an
//! isolated subprocess, reads and writes wizard state through this store so
//! a conversation survives being served by a different worker on each
//! message. The shared database is the source of truth; each process keeps a
//! local read cache that is invalidated on every write.
//!
//! Consistency is last-write-wins per field with no multi-field atomicity.
//! The store must never hold money: monetary fields go only through the
//! payment ledger.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use tarjima_core::types::ConversationState;
use tarjima_core::TarjimaError;
use tarjima_storage::queries::conversation::{self, ScalarField};
use tarjima_storage::Database;

/// Key prefix for conversation entries in the shared store.
pub const KEY_PREFIX: &str = "convo:";

/// Entries expire after 24 hours; an order flow is expected to finish well
/// within that.
pub const DEFAULT_TTL_SECS: i64 = 86_400;

/// Build the store key for one end user of one tenant.
pub fn user_key(tenant_id: i64, user_id: &str) -> String {
    format!("{KEY_PREFIX}{tenant_id}:{user_id}")
}

/// Shared per-user wizard state with a process-local read cache.
pub struct ConversationStore {
    db: Arc<Database>,
    cache: DashMap<String, ConversationState>,
    ttl_secs: i64,
}

impl ConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_ttl(db, DEFAULT_TTL_SECS)
    }

    /// Store with a custom TTL. Tests use short or negative TTLs to
    /// exercise expiry.
    pub fn with_ttl(db: Arc<Database>, ttl_secs: i64) -> Self {
        Self {
            db,
            cache: DashMap::new(),
            ttl_secs,
        }
    }

    /// Current state for a key, empty on first access.
    pub async fn get(&self, key: &str) -> Result<ConversationState, TarjimaError> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }

        let state = conversation::get(&self.db, key).await?.unwrap_or_default();
        self.cache.insert(key.to_string(), state.clone());
        Ok(state)
    }

    fn invalidate(&self, key: &str) {
        self.cache.remove(key);
        debug!(key, "conversation cache invalidated");
    }

    pub async fn set_current_order(
        &self,
        key: &str,
        order_id: Option<i64>,
    ) -> Result<(), TarjimaError> {
        conversation::set_scalar(&self.db, key, ScalarField::CurrentOrder, order_id, self.ttl_secs)
            .await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn set_category(&self, key: &str, id: Option<i64>) -> Result<(), TarjimaError> {
        conversation::set_scalar(&self.db, key, ScalarField::Category, id, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn set_product(&self, key: &str, id: Option<i64>) -> Result<(), TarjimaError> {
        conversation::set_scalar(&self.db, key, ScalarField::Product, id, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn set_language(&self, key: &str, id: Option<i64>) -> Result<(), TarjimaError> {
        conversation::set_scalar(&self.db, key, ScalarField::Language, id, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn set_copy_count(&self, key: &str, count: u32) -> Result<(), TarjimaError> {
        conversation::set_copy_count(&self.db, key, count, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn set_pending_payment_order(
        &self,
        key: &str,
        order_id: Option<i64>,
    ) -> Result<(), TarjimaError> {
        conversation::set_scalar(
            &self.db,
            key,
            ScalarField::PendingPayment,
            order_id,
            self.ttl_secs,
        )
        .await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn set_pending_receipt_order(
        &self,
        key: &str,
        order_id: Option<i64>,
    ) -> Result<(), TarjimaError> {
        conversation::set_scalar(
            &self.db,
            key,
            ScalarField::PendingReceipt,
            order_id,
            self.ttl_secs,
        )
        .await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn add_file_id(&self, key: &str, file_id: &str) -> Result<(), TarjimaError> {
        conversation::append_file_id(&self.db, key, file_id, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn add_message_id(&self, key: &str, message_id: i64) -> Result<(), TarjimaError> {
        conversation::append_message_id(&self.db, key, message_id, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    pub async fn clear_message_ids(&self, key: &str) -> Result<(), TarjimaError> {
        conversation::clear_message_ids(&self.db, key, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    /// Set one entry in the free-form extension map.
    pub async fn set_extra(
        &self,
        key: &str,
        name: &str,
        value: serde_json::Value,
    ) -> Result<(), TarjimaError> {
        conversation::set_extra(&self.db, key, name, value, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    /// Reset wizard-scoped fields only; the user identity behind the key is
    /// untouched.
    pub async fn clear(&self, key: &str) -> Result<(), TarjimaError> {
        conversation::clear(&self.db, key, self.ttl_secs).await?;
        self.invalidate(key);
        Ok(())
    }

    /// Sweep expired entries. Called periodically by the supervisor.
    pub async fn purge_expired(&self) -> Result<usize, TarjimaError> {
        let purged = conversation::purge_expired(&self.db).await?;
        if purged > 0 {
            self.cache.clear();
            debug!(purged, "expired conversation entries purged");
        }
        Ok(purged)
    }
}
