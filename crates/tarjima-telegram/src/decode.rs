// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of raw Telegram updates into the channel-agnostic
//! [`InboundUpdate`] the wizard consumes.
//!
//! Both ingestion paths land here: long polling converts deserialized
//! updates directly, the webhook gateway hands over the raw request body.

use teloxide::types::{Update, UpdateKind as TgUpdateKind};
use tracing::debug;

use tarjima_core::types::{InboundUpdate, UpdateKind};
use tarjima_core::TarjimaError;

/// Reduce one Telegram update to the fields the wizard cares about.
///
/// Returns `None` for update types the order flow ignores (edited
/// messages, stickers, member changes, and so on).
pub fn convert_update(tenant_id: i64, update: Update) -> Option<InboundUpdate> {
    let update_id = update.id.0 as i64;

    match update.kind {
        TgUpdateKind::Message(msg) => {
            let sender_id = msg
                .from
                .as_ref()
                .map(|u| u.id.0.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            let kind = if let Some(text) = msg.text() {
                UpdateKind::Text(text.to_string())
            } else if let Some(doc) = msg.document() {
                UpdateKind::Document {
                    file_id: doc.file.id.to_string(),
                    file_name: doc.file_name.clone(),
                }
            } else {
                debug!(msg_id = msg.id.0, "ignoring unsupported message type");
                return None;
            };

            Some(InboundUpdate {
                update_id,
                tenant_id,
                chat_id: msg.chat.id.0,
                sender_id,
                message_id: Some(msg.id.0 as i64),
                kind,
            })
        }
        TgUpdateKind::CallbackQuery(query) => {
            let data = query.data?;
            // Wizard callbacks arrive from private chats, so the sender's
            // own chat is the reply destination.
            Some(InboundUpdate {
                update_id,
                tenant_id,
                chat_id: query.from.id.0 as i64,
                sender_id: query.from.id.0.to_string(),
                message_id: None,
                kind: UpdateKind::Callback(data),
            })
        }
        _ => None,
    }
}

/// Decode a webhook request body into an [`InboundUpdate`].
///
/// A malformed body is a terminal platform error; a well-formed update the
/// wizard ignores decodes to `Ok(None)`.
pub fn decode_webhook_update(
    tenant_id: i64,
    body: &str,
) -> Result<Option<InboundUpdate>, TarjimaError> {
    let update: Update = serde_json::from_str(body)
        .map_err(|e| TarjimaError::platform(format!("invalid update payload: {e}"), false))?;
    Ok(convert_update(tenant_id, update))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a raw update JSON body matching the Telegram Bot API structure.
    fn message_body(text: &str) -> String {
        serde_json::json!({
            "update_id": 1001,
            "message": {
                "message_id": 55,
                "date": 1700000000i64,
                "chat": {
                    "id": 123456789i64,
                    "type": "private",
                    "first_name": "Test",
                },
                "from": {
                    "id": 123456789u64,
                    "is_bot": false,
                    "first_name": "Test",
                },
                "text": text,
            }
        })
        .to_string()
    }

    fn document_body() -> String {
        serde_json::json!({
            "update_id": 1002,
            "message": {
                "message_id": 56,
                "date": 1700000000i64,
                "chat": {
                    "id": 123456789i64,
                    "type": "private",
                    "first_name": "Test",
                },
                "from": {
                    "id": 123456789u64,
                    "is_bot": false,
                    "first_name": "Test",
                },
                "document": {
                    "file_id": "BQACAgIAAxkBAAI",
                    "file_unique_id": "AgADsQ",
                    "file_name": "passport.pdf",
                },
            }
        })
        .to_string()
    }

    fn callback_body(data: &str) -> String {
        serde_json::json!({
            "update_id": 1003,
            "callback_query": {
                "id": "cbq-1",
                "from": {
                    "id": 123456789u64,
                    "is_bot": false,
                    "first_name": "Test",
                },
                "chat_instance": "ci-1",
                "data": data,
            }
        })
        .to_string()
    }

    #[test]
    fn text_message_decodes() {
        let update = decode_webhook_update(3, &message_body("/start"))
            .unwrap()
            .unwrap();
        assert_eq!(update.tenant_id, 3);
        assert_eq!(update.update_id, 1001);
        assert_eq!(update.chat_id, 123456789);
        assert_eq!(update.sender_id, "123456789");
        assert_eq!(update.message_id, Some(55));
        assert!(matches!(update.kind, UpdateKind::Text(ref t) if t == "/start"));
    }

    #[test]
    fn document_message_decodes_with_file_metadata() {
        let update = decode_webhook_update(3, &document_body()).unwrap().unwrap();
        match update.kind {
            UpdateKind::Document { file_id, file_name } => {
                assert_eq!(file_id, "BQACAgIAAxkBAAI");
                assert_eq!(file_name.as_deref(), Some("passport.pdf"));
            }
            other => panic!("expected document, got {other:?}"),
        }
    }

    #[test]
    fn callback_query_decodes_to_callback() {
        let update = decode_webhook_update(3, &callback_body("category:4"))
            .unwrap()
            .unwrap();
        assert_eq!(update.chat_id, 123456789);
        assert!(matches!(update.kind, UpdateKind::Callback(ref d) if d == "category:4"));
    }

    #[test]
    fn callback_without_data_is_ignored() {
        let body = serde_json::json!({
            "update_id": 1004,
            "callback_query": {
                "id": "cbq-2",
                "from": {
                    "id": 123456789u64,
                    "is_bot": false,
                    "first_name": "Test",
                },
                "chat_instance": "ci-1",
            }
        })
        .to_string();
        assert!(decode_webhook_update(3, &body).unwrap().is_none());
    }

    #[test]
    fn malformed_body_is_a_terminal_error() {
        let err = decode_webhook_update(3, "not json").unwrap_err();
        assert!(!err.is_retryable());
    }
}
