// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One tenant's long-lived bot runtime.
//!
//! The runtime clears any stale webhook registration, then loops over two
//! input paths: long polling against the platform and the webhook inbox
//! fed by the gateway. Poll failures (including a credential invalidated
//! mid-run) are logged and retried after a fixed backoff; they never bring
//! the loop down. The credential binding is immutable for the runtime's
//! lifetime, so rotation always goes through a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tarjima_core::types::{InboundUpdate, Tenant};
use tarjima_core::{MessengerApi, UpdateHandler};

/// Per-tenant polling loop.
pub struct BotRuntime {
    tenant: Tenant,
    messenger: Arc<dyn MessengerApi>,
    handler: Arc<dyn UpdateHandler>,
    inbox: mpsc::Receiver<InboundUpdate>,
    poll_timeout_secs: u32,
    retry_delay: Duration,
}

impl BotRuntime {
    pub fn new(
        tenant: Tenant,
        messenger: Arc<dyn MessengerApi>,
        handler: Arc<dyn UpdateHandler>,
        inbox: mpsc::Receiver<InboundUpdate>,
        poll_timeout_secs: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            tenant,
            messenger,
            handler,
            inbox,
            poll_timeout_secs,
            retry_delay,
        }
    }

    /// Run until the cancellation token fires.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            tenant,
            messenger,
            handler,
            mut inbox,
            poll_timeout_secs,
            retry_delay,
        } = self;

        // A leftover webhook registration would swallow the update stream.
        if let Err(e) = messenger.delete_webhook().await {
            warn!(
                tenant_id = tenant.id,
                error = %e,
                "could not clear webhook registration"
            );
        }

        info!(
            tenant_id = tenant.id,
            tenant_name = tenant.name.as_str(),
            "bot runtime started"
        );

        let mut offset: Option<i64> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                Some(update) = inbox.recv() => {
                    dispatch(handler.as_ref(), tenant.id, update).await;
                }

                batch = messenger.poll_updates(offset, poll_timeout_secs) => {
                    match batch {
                        Ok(batch) => {
                            if let Some(next) = batch.next_offset {
                                offset = Some(next);
                            }
                            for update in batch.updates {
                                dispatch(handler.as_ref(), tenant.id, update).await;
                            }
                        }
                        Err(e) => {
                            warn!(
                                tenant_id = tenant.id,
                                error = %e,
                                delay_secs = retry_delay.as_secs(),
                                "polling failed, backing off"
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(retry_delay) => {}
                            }
                        }
                    }
                }
            }
        }

        info!(tenant_id = tenant.id, "bot runtime stopped");
    }
}

/// Hand one update to the handler. Handler errors are logged and swallowed
/// so one bad update cannot stall the loop.
async fn dispatch(handler: &dyn UpdateHandler, tenant_id: i64, update: InboundUpdate) {
    if let Err(e) = handler.handle(update).await {
        error!(tenant_id, error = %e, "update handler failed");
    }
}
