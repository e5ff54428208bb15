// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pull variant of notification delivery (§4.6): for backends whose
//! publisher can't reach a push endpoint, the engine polls a subscription
//! itself, dispatches one message through `Engine::process_notification`,
//! and acks or nacks depending on the outcome.

use async_trait::async_trait;
use crond_backends::NotificationMessage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PullError {
    #[error("pull subscription unavailable: {0}")]
    Unavailable(String),
}

/// A pull-style subscription transport: fetch one message at a time, then
/// acknowledge or negatively-acknowledge it once the engine has decided
/// whether delivery should be retried.
#[async_trait]
pub trait NotificationPuller: Send + Sync {
    async fn pull(&self) -> Result<Option<NotificationMessage>, PullError>;
    async fn ack(&self, message_id: &str) -> Result<(), PullError>;
    async fn nack(&self, message_id: &str) -> Result<(), PullError>;
}

/// In-memory reference puller: a FIFO of pre-seeded messages, acked/nacked
/// into separate logs a test can inspect. No redelivery-on-nack timer —
/// that's the real transport's job, not this reference's.
#[derive(Default)]
pub struct MemoryNotificationPuller {
    pending: Mutex<VecDeque<NotificationMessage>>,
    acked: Mutex<Vec<String>>,
    nacked: Mutex<Vec<String>>,
}

impl MemoryNotificationPuller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: NotificationMessage) {
        self.pending.lock().push_back(msg);
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().clone()
    }

    pub fn nacked(&self) -> Vec<String> {
        self.nacked.lock().clone()
    }
}

#[async_trait]
impl NotificationPuller for MemoryNotificationPuller {
    async fn pull(&self) -> Result<Option<NotificationMessage>, PullError> {
        Ok(self.pending.lock().pop_front())
    }

    async fn ack(&self, message_id: &str) -> Result<(), PullError> {
        self.acked.lock().push(message_id.to_string());
        Ok(())
    }

    async fn nack(&self, message_id: &str) -> Result<(), PullError> {
        self.nacked.lock().push(message_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str) -> NotificationMessage {
        NotificationMessage { attributes: Default::default(), data: Vec::new(), message_id: id.to_string() }
    }

    #[tokio::test]
    async fn pulls_in_fifo_order() {
        let puller = MemoryNotificationPuller::new();
        puller.push(msg("a"));
        puller.push(msg("b"));
        assert_eq!(puller.pull().await.unwrap().unwrap().message_id, "a");
        assert_eq!(puller.pull().await.unwrap().unwrap().message_id, "b");
        assert!(puller.pull().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_and_nack_are_recorded_separately() {
        let puller = MemoryNotificationPuller::new();
        puller.ack("x").await.unwrap();
        puller.nack("y").await.unwrap();
        assert_eq!(puller.acked(), vec!["x".to_string()]);
        assert_eq!(puller.nacked(), vec!["y".to_string()]);
    }
}
