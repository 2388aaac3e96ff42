// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process realtime service.
//!
//! Tests push events with the `push_*` methods; every live subscription for
//! the matching key receives a copy. Outbound publishes (presence, visitor
//! typing) are captured for assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use parley_core::error::ParleyError;
use parley_core::traits::{PortAdapter, RealtimeAdapter, Subscription};
use parley_core::types::{
    AgentId, ConfigChanged, ConversationId, ConversationStatus, MessageEvent, PresenceRecord,
    StatusEvent, TypingEvent,
};

const SUBSCRIPTION_BUFFER: usize = 64;

/// Subscribers of one channel kind, keyed by subscription id.
struct Topic<T> {
    subscribers: Arc<DashMap<u64, (String, mpsc::Sender<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + 'static> Topic<T> {
    fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribe(&self, key: &str) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscribers.insert(id, (key.to_string(), tx));

        let subscribers = self.subscribers.clone();
        Subscription::new(rx, move || {
            subscribers.remove(&id);
        })
    }

    fn push(&self, key: &str, event: T) -> usize {
        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            let (subscriber_key, tx) = entry.value();
            if subscriber_key == key && tx.try_send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn count(&self, key: &str) -> usize {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().0 == key)
            .count()
    }
}

pub struct InMemoryRealtime {
    messages: Topic<MessageEvent>,
    status: Topic<StatusEvent>,
    typing: Topic<TypingEvent>,
    config: Topic<ConfigChanged>,
    presence: Mutex<Vec<PresenceRecord>>,
    visitor_typing: Mutex<Vec<TypingEvent>>,
    subscriptions_failing: AtomicBool,
}

impl InMemoryRealtime {
    pub fn new() -> Self {
        Self {
            messages: Topic::new(),
            status: Topic::new(),
            typing: Topic::new(),
            config: Topic::new(),
            presence: Mutex::new(Vec::new()),
            visitor_typing: Mutex::new(Vec::new()),
            subscriptions_failing: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent subscribe call fail.
    pub fn set_subscriptions_failing(&self, failing: bool) {
        self.subscriptions_failing.store(failing, Ordering::SeqCst);
    }

    /// Delivers a message event to subscribers of its conversation.
    pub fn push_message(&self, event: MessageEvent) -> usize {
        let key = event.conversation_id.to_string();
        trace!(conversation_id = %key, message_id = %event.message.id, "push message");
        self.messages.push(&key, event)
    }

    /// Delivers a message event to subscribers of `conversation_id`, whatever
    /// conversation the event itself names.
    pub fn push_message_to(&self, conversation_id: &ConversationId, event: MessageEvent) -> usize {
        self.messages.push(conversation_id.as_str(), event)
    }

    pub fn push_status(&self, conversation_id: &ConversationId, status: ConversationStatus) -> usize {
        self.status.push(
            conversation_id.as_str(),
            StatusEvent {
                conversation_id: conversation_id.clone(),
                status,
            },
        )
    }

    pub fn push_typing(&self, event: TypingEvent) -> usize {
        let key = event.conversation_id.to_string();
        self.typing.push(&key, event)
    }

    pub fn push_config_change(&self, agent_id: &AgentId) -> usize {
        self.config.push(
            &agent_id.0,
            ConfigChanged {
                agent_id: agent_id.clone(),
                at: Utc::now(),
            },
        )
    }

    pub fn message_subscribers(&self, conversation_id: &ConversationId) -> usize {
        self.messages.count(conversation_id.as_str())
    }

    pub fn status_subscribers(&self, conversation_id: &ConversationId) -> usize {
        self.status.count(conversation_id.as_str())
    }

    pub fn typing_subscribers(&self, conversation_id: &ConversationId) -> usize {
        self.typing.count(conversation_id.as_str())
    }

    pub fn config_subscribers(&self, agent_id: &AgentId) -> usize {
        self.config.count(&agent_id.0)
    }

    /// Presence records published so far.
    pub fn presence_records(&self) -> Vec<PresenceRecord> {
        self.presence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Visitor typing events published so far.
    pub fn visitor_typing(&self) -> Vec<TypingEvent> {
        self.visitor_typing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_subscribe(&self) -> Result<(), ParleyError> {
        if self.subscriptions_failing.load(Ordering::SeqCst) {
            return Err(ParleyError::subscription("realtime unavailable"));
        }
        Ok(())
    }
}

impl Default for InMemoryRealtime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortAdapter for InMemoryRealtime {
    fn name(&self) -> &str {
        "in-memory-realtime"
    }
}

#[async_trait]
impl RealtimeAdapter for InMemoryRealtime {
    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<MessageEvent>, ParleyError> {
        self.check_subscribe()?;
        Ok(self.messages.subscribe(conversation_id.as_str()))
    }

    async fn subscribe_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<StatusEvent>, ParleyError> {
        self.check_subscribe()?;
        Ok(self.status.subscribe(conversation_id.as_str()))
    }

    async fn subscribe_typing(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Subscription<TypingEvent>, ParleyError> {
        self.check_subscribe()?;
        Ok(self.typing.subscribe(conversation_id.as_str()))
    }

    async fn subscribe_config(
        &self,
        agent_id: &AgentId,
    ) -> Result<Subscription<ConfigChanged>, ParleyError> {
        self.check_subscribe()?;
        Ok(self.config.subscribe(&agent_id.0))
    }

    async fn publish_presence(&self, record: PresenceRecord) -> Result<(), ParleyError> {
        self.presence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    async fn publish_typing(&self, event: TypingEvent) -> Result<(), ParleyError> {
        self.visitor_typing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
