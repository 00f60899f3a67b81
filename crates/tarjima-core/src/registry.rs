// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry mapping tenant ids to live runtime inboxes.
//!
//! The webhook gateway routes inbound updates through this registry; the
//! supervisor registers a sink per started runtime and removes it on stop.
//! A legacy single-tenant deployment routes through the default slot.

use std::sync::RwLock;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TarjimaError;
use crate::types::InboundUpdate;

/// Sending side of a runtime's update inbox.
pub type UpdateSink = mpsc::Sender<InboundUpdate>;

/// Shared tenant-to-runtime routing table.
#[derive(Default)]
pub struct RuntimeRegistry {
    sinks: DashMap<i64, UpdateSink>,
    default_tenant: RwLock<Option<i64>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a runtime's inbox. The first registration also becomes the
    /// default route for the legacy webhook endpoint.
    pub fn register(&self, tenant_id: i64, sink: UpdateSink) {
        self.sinks.insert(tenant_id, sink);
        let mut default = self.default_tenant.write().expect("registry lock poisoned");
        if default.is_none() {
            *default = Some(tenant_id);
        }
        debug!(tenant_id, "runtime registered");
    }

    /// Removes a runtime's inbox, clearing the default slot if it pointed here.
    pub fn unregister(&self, tenant_id: i64) {
        self.sinks.remove(&tenant_id);
        let mut default = self.default_tenant.write().expect("registry lock poisoned");
        if *default == Some(tenant_id) {
            *default = self.sinks.iter().next().map(|e| *e.key());
        }
        debug!(tenant_id, "runtime unregistered");
    }

    pub fn is_registered(&self, tenant_id: i64) -> bool {
        self.sinks.contains_key(&tenant_id)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Routes an update to the runtime registered for its tenant.
    pub async fn route(&self, update: InboundUpdate) -> Result<(), TarjimaError> {
        let tenant_id = update.tenant_id;
        let sink = self
            .sinks
            .get(&tenant_id)
            .map(|entry| entry.value().clone())
            .ok_or(TarjimaError::RuntimeUnavailable { tenant_id })?;

        sink.send(update)
            .await
            .map_err(|_| TarjimaError::RuntimeUnavailable { tenant_id })
    }

    /// Routes an update through the default slot (legacy single-tenant path).
    pub async fn route_default(&self, mut update: InboundUpdate) -> Result<(), TarjimaError> {
        let tenant_id = {
            let default = self.default_tenant.read().expect("registry lock poisoned");
            default.ok_or(TarjimaError::RuntimeUnavailable { tenant_id: 0 })?
        };
        update.tenant_id = tenant_id;
        self.route(update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UpdateKind;

    fn make_update(tenant_id: i64) -> InboundUpdate {
        InboundUpdate {
            update_id: 1,
            tenant_id,
            chat_id: 42,
            sender_id: "user".into(),
            message_id: Some(7),
            kind: UpdateKind::Text("hello".into()),
        }
    }

    #[tokio::test]
    async fn routes_to_registered_runtime() {
        let registry = RuntimeRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(3, tx);

        registry.route(make_update(3)).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.tenant_id, 3);
    }

    #[tokio::test]
    async fn unknown_tenant_is_unavailable() {
        let registry = RuntimeRegistry::new();
        let err = registry.route(make_update(9)).await.unwrap_err();
        assert!(matches!(
            err,
            TarjimaError::RuntimeUnavailable { tenant_id: 9 }
        ));
    }

    #[tokio::test]
    async fn first_registration_becomes_default() {
        let registry = RuntimeRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(5, tx);

        // Update arrives without a resolvable tenant; default takes it.
        registry.route_default(make_update(0)).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.tenant_id, 5);
    }

    #[tokio::test]
    async fn unregister_clears_default() {
        let registry = RuntimeRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.register(5, tx);
        registry.unregister(5);

        assert!(registry.is_empty());
        let err = registry.route_default(make_update(0)).await.unwrap_err();
        assert!(matches!(err, TarjimaError::RuntimeUnavailable { .. }));
    }

    #[tokio::test]
    async fn dropped_receiver_is_unavailable() {
        let registry = RuntimeRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        registry.register(2, tx);
        drop(rx);

        let err = registry.route(make_update(2)).await.unwrap_err();
        assert!(matches!(
            err,
            TarjimaError::RuntimeUnavailable { tenant_id: 2 }
        ));
    }
}
