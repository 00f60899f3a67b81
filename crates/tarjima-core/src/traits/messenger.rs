// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messenger adapter trait for the external messaging platform.

use async_trait::async_trait;

use crate::error::TarjimaError;
use crate::types::{ChannelId, InboundUpdate, MessageRef, WebhookStatus};

/// A batch of long-polled updates plus the offset to resume from.
#[derive(Debug, Clone)]
pub struct PollBatch {
    pub updates: Vec<InboundUpdate>,
    /// Offset acknowledging everything in `updates`. `None` when the batch
    /// is empty and the previous offset still stands.
    pub next_offset: Option<i64>,
}

/// Adapter for one tenant's connection to the messaging platform.
///
/// An implementation is bound to a single tenant credential at construction
/// and never re-bound. Credential rotation means building a new instance.
#[async_trait]
pub trait MessengerApi: Send + Sync + 'static {
    /// The tenant this client is bound to.
    fn tenant_id(&self) -> i64;

    /// Sends an HTML-formatted message to a destination channel or chat.
    async fn send_message(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> Result<MessageRef, TarjimaError>;

    /// Deletes a previously sent message (wizard prompt cleanup).
    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: MessageRef,
    ) -> Result<(), TarjimaError>;

    /// Long-polls for the next batch of updates.
    ///
    /// Blocks up to `timeout_secs` waiting for input. Transient failures
    /// surface as retryable platform errors.
    async fn poll_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u32,
    ) -> Result<PollBatch, TarjimaError>;

    /// Registers the webhook URL for this tenant's bot.
    async fn set_webhook(&self, url: &str) -> Result<(), TarjimaError>;

    /// Clears any webhook registration so long polling can take over.
    async fn delete_webhook(&self) -> Result<(), TarjimaError>;

    /// Fetches webhook diagnostics (pending update count, last error).
    async fn webhook_info(&self) -> Result<WebhookStatus, TarjimaError>;
}
