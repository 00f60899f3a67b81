// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messenger for deterministic testing.
//!
//! `MockMessenger` implements [`MessengerApi`] with injectable poll batches
//! and captured outbound messages for assertion in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use tarjima_core::traits::messenger::PollBatch;
use tarjima_core::types::{ChannelId, InboundUpdate, MessageRef, WebhookStatus};
use tarjima_core::{MessengerApi, TarjimaError};

/// A mock messaging platform client.
///
/// Two queues drive it:
/// - **polls**: batches injected via `inject_batch()` are returned by
///   `poll_updates()`, which otherwise waits like a real long poll
/// - **sent**: messages passed to `send_message()` are captured and
///   retrievable via `sent_messages()`
pub struct MockMessenger {
    tenant_id: i64,
    polls: Mutex<VecDeque<PollBatch>>,
    sent: Mutex<Vec<(ChannelId, String)>>,
    deleted: Mutex<Vec<(ChannelId, MessageRef)>>,
    notify: Arc<Notify>,
    next_message_id: AtomicI64,
    /// Sends left to fail before succeeding.
    fail_sends: AtomicU32,
    /// When failing, whether the error is terminal.
    fail_terminal: std::sync::atomic::AtomicBool,
    /// Polls left to fail before succeeding.
    fail_polls: AtomicU32,
    webhook_url: Mutex<Option<String>>,
    webhook_deletes: AtomicUsize,
}

impl MockMessenger {
    pub fn new(tenant_id: i64) -> Arc<Self> {
        Arc::new(Self {
            tenant_id,
            polls: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            notify: Arc::new(Notify::new()),
            next_message_id: AtomicI64::new(1000),
            fail_sends: AtomicU32::new(0),
            fail_terminal: std::sync::atomic::AtomicBool::new(false),
            fail_polls: AtomicU32::new(0),
            webhook_url: Mutex::new(None),
            webhook_deletes: AtomicUsize::new(0),
        })
    }

    /// Queue a poll batch; the next `poll_updates()` call returns it.
    pub fn inject_batch(&self, updates: Vec<InboundUpdate>) {
        let next_offset = updates.iter().map(|u| u.update_id + 1).max();
        self.polls.lock().unwrap().push_back(PollBatch {
            updates,
            next_offset,
        });
        self.notify.notify_one();
    }

    /// Fail the next `n` sends; terminal errors do not retry.
    pub fn fail_next_sends(&self, n: u32, terminal: bool) {
        self.fail_sends.store(n, Ordering::SeqCst);
        self.fail_terminal.store(terminal, Ordering::SeqCst);
    }

    /// Fail the next `n` polls with a retryable error.
    pub fn fail_next_polls(&self, n: u32) {
        self.fail_polls.store(n, Ordering::SeqCst);
    }

    pub fn sent_messages(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn deleted_messages(&self) -> Vec<(ChannelId, MessageRef)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn webhook_delete_count(&self) -> usize {
        self.webhook_deletes.load(Ordering::SeqCst)
    }

    pub fn registered_webhook(&self) -> Option<String> {
        self.webhook_url.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessengerApi for MockMessenger {
    fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    async fn send_message(
        &self,
        channel: &ChannelId,
        text: &str,
    ) -> Result<MessageRef, TarjimaError> {
        let failures = self.fail_sends.load(Ordering::SeqCst);
        if failures > 0 {
            self.fail_sends.store(failures - 1, Ordering::SeqCst);
            let terminal = self.fail_terminal.load(Ordering::SeqCst);
            return Err(TarjimaError::platform("mock send failure", !terminal));
        }

        self.sent
            .lock()
            .unwrap()
            .push((channel.clone(), text.to_string()));
        Ok(MessageRef(self.next_message_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_message(
        &self,
        channel: &ChannelId,
        message: MessageRef,
    ) -> Result<(), TarjimaError> {
        self.deleted.lock().unwrap().push((channel.clone(), message));
        Ok(())
    }

    async fn poll_updates(
        &self,
        _offset: Option<i64>,
        _timeout_secs: u32,
    ) -> Result<PollBatch, TarjimaError> {
        let failures = self.fail_polls.load(Ordering::SeqCst);
        if failures > 0 {
            self.fail_polls.store(failures - 1, Ordering::SeqCst);
            return Err(TarjimaError::platform("mock poll failure", true));
        }

        loop {
            {
                let mut polls = self.polls.lock().unwrap();
                if let Some(batch) = polls.pop_front() {
                    return Ok(batch);
                }
            }
            // Block like a real long poll until a batch is injected.
            self.notify.notified().await;
        }
    }

    async fn set_webhook(&self, url: &str) -> Result<(), TarjimaError> {
        *self.webhook_url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<(), TarjimaError> {
        self.webhook_deletes.fetch_add(1, Ordering::SeqCst);
        *self.webhook_url.lock().unwrap() = None;
        Ok(())
    }

    async fn webhook_info(&self) -> Result<WebhookStatus, TarjimaError> {
        Ok(WebhookStatus {
            url: self.webhook_url.lock().unwrap().clone(),
            pending_update_count: self.polls.lock().unwrap().len() as u32,
            last_error_message: None,
        })
    }
}
