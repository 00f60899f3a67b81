// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-update handler trait driven by a tenant runtime.

use async_trait::async_trait;

use crate::error::TarjimaError;
use crate::types::InboundUpdate;

/// Handles one inbound update for one tenant.
///
/// Implementations must be safe to call from the runtime loop: an error
/// return is logged and the loop continues. Handlers never see two updates
/// for the same tenant concurrently from the same runtime, but the same
/// user may be served by a different process on the next message, so all
/// conversation state goes through the shared store.
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    async fn handle(&self, update: InboundUpdate) -> Result<(), TarjimaError>;
}
