// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram messenger adapter.
//!
//! Implements [`MessengerApi`] for the Telegram Bot API via teloxide: HTML
//! sends, webhook management, and manual long polling. One instance is
//! bound to one tenant credential at construction; the binding is never
//! swapped, so serving another tenant always means another instance.

pub mod decode;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, ChatId, ParseMode, Recipient, Url};
use teloxide::{ApiError, RequestError};
use tracing::debug;

use tarjima_core::traits::messenger::PollBatch;
use tarjima_core::types::{ChannelId, MessageRef, WebhookStatus};
use tarjima_core::{MessengerApi, TarjimaError};

pub use decode::decode_webhook_update;

/// Telegram client for one tenant's bot.
pub struct TelegramMessenger {
    tenant_id: i64,
    bot: Bot,
}

impl TelegramMessenger {
    /// Creates a client bound to one tenant credential.
    ///
    /// `api_url` overrides the Bot API server for self-hosted setups.
    pub fn new(tenant_id: i64, token: &str, api_url: Option<&str>) -> Result<Self, TarjimaError> {
        if token.is_empty() {
            return Err(TarjimaError::Config(format!(
                "tenant {tenant_id} bot credential cannot be empty"
            )));
        }

        let mut bot = Bot::new(token);
        if let Some(url) = api_url {
            let url = Url::parse(url)
                .map_err(|e| TarjimaError::Config(format!("invalid telegram.api_url: {e}")))?;
            bot = bot.set_api_url(url);
        }

        Ok(Self { tenant_id, bot })
    }

    /// The underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

/// Parse a destination channel id into a Telegram chat id.
fn chat_id(channel: &ChannelId) -> Result<ChatId, TarjimaError> {
    channel
        .0
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| TarjimaError::platform(format!("invalid channel id `{channel}`"), false))
}

/// Map a teloxide error onto the platform error taxonomy.
///
/// Destination-gone errors are terminal; everything else (network blips,
/// rate limits, server hiccups) is worth retrying.
fn classify(err: RequestError) -> TarjimaError {
    let terminal = matches!(
        &err,
        RequestError::Api(
            ApiError::ChatNotFound
                | ApiError::BotBlocked
                | ApiError::UserDeactivated
                | ApiError::InvalidToken
        )
    );
    TarjimaError::Platform {
        message: err.to_string(),
        retryable: !terminal,
        source: Some(Box::new(err)),
    }
}

#[async_trait]
impl MessengerApi for TelegramMessenger {
    fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> Result<MessageRef, TarjimaError> {
        let chat = chat_id(channel)?;
        let sent = self
            .bot
            .send_message(Recipient::Id(chat), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(classify)?;
        Ok(MessageRef(sent.id.0 as i64))
    }

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: MessageRef,
    ) -> Result<(), TarjimaError> {
        let chat = chat_id(channel)?;
        self.bot
            .delete_message(chat, teloxide::types::MessageId(message.0 as i32))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn poll_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u32,
    ) -> Result<PollBatch, TarjimaError> {
        let mut request = self
            .bot
            .get_updates()
            .timeout(timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery]);
        if let Some(offset) = offset {
            request = request.offset(offset as i32);
        }

        let raw = request.await.map_err(classify)?;

        let next_offset = raw.iter().map(|u| u.id.0 as i64 + 1).max();
        let updates = raw
            .into_iter()
            .filter_map(|u| decode::convert_update(self.tenant_id, u))
            .collect::<Vec<_>>();

        debug!(
            tenant_id = self.tenant_id,
            count = updates.len(),
            "long poll batch received"
        );
        Ok(PollBatch {
            updates,
            next_offset,
        })
    }

    async fn set_webhook(&self, url: &str) -> Result<(), TarjimaError> {
        let url = Url::parse(url)
            .map_err(|e| TarjimaError::platform(format!("invalid webhook url: {e}"), false))?;
        self.bot.set_webhook(url).await.map_err(classify)?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<(), TarjimaError> {
        self.bot.delete_webhook().await.map_err(classify)?;
        Ok(())
    }

    async fn webhook_info(&self) -> Result<WebhookStatus, TarjimaError> {
        let info = self.bot.get_webhook_info().await.map_err(classify)?;
        Ok(WebhookStatus {
            url: info.url.map(|u| u.to_string()),
            pending_update_count: info.pending_update_count,
            last_error_message: info.last_error_message,
        })
    }
}
