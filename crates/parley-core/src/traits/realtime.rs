// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime port: push channels scoped by conversation or agent.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ParleyError;
use crate::traits::adapter::PortAdapter;
use crate::types::{
    AgentId, ConfigChanged, ConversationId, MessageEvent, PresenceRecord, StatusEvent,
    TypingEvent,
};

/// A live push subscription.
///
/// Dropping the subscription runs its unsubscribe hook, so a subscription can
/// never outlive the scope that owns it.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> Subscription<T> {
    /// Wraps a receiver with a hook that runs exactly once on teardown.
    pub fn new(rx: mpsc::Receiver<T>, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Wraps a receiver whose sender side needs no explicit teardown.
    pub fn detached(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx,
            unsubscribe: None,
        }
    }

    /// Receives the next pushed event. `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Tears the subscription down now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(hook) = self.unsubscribe.take() {
            hook();
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_unsubscribe_hook", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Adapter for the realtime push service.
///
/// Publishes are fire-and-forget: there is no delivery guarantee and callers
/// do not retry.
#[async_trait]
pub trait RealtimeAdapter: PortAdapter {
    /// Message create/update events for one conversation.
    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<MessageEvent>, ParleyError>;

    /// Status changes for one conversation.
    async fn subscribe_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<StatusEvent>, ParleyError>;

    /// Operator typing indicators for one conversation.
    async fn subscribe_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<TypingEvent>, ParleyError>;

    /// Widget configuration change notifications for one agent.
    async fn subscribe_config(
        &self,
        agent_id: &AgentId,
    ) -> Result<Subscription<ConfigChanged>, ParleyError>;

    /// Announces the visitor's presence to operators.
    async fn publish_presence(&self, record: PresenceRecord) -> Result<(), ParleyError>;

    /// Announces the visitor's own typing state to operators.
    async fn publish_typing(&self, event: TypingEvent) -> Result<(), ParleyError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn drop_runs_unsubscribe_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<u8>(4);
        let hook_calls = calls.clone();
        let mut sub = Subscription::new(rx, move || {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(1).await.unwrap();
        assert_eq!(sub.recv().await, Some(1));

        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tx.is_closed(), "sender must observe teardown");
    }

    #[tokio::test]
    async fn detached_subscription_closes_channel() {
        let (tx, rx) = mpsc::channel::<u8>(1);
        let sub = Subscription::detached(rx);
        drop(sub);
        assert!(tx.send(1).await.is_err());
    }
}
