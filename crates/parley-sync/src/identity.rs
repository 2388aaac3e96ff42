// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-persisted visitor state.
//!
//! Values are JSON-encoded under typed [`StorageKey`]s. Storage is best
//! effort: a failing store or an unparseable value is logged and treated as
//! absent, never surfaced to the caller.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use parley_core::traits::{KeyValueStore, StorageField, StorageKey};
use parley_core::types::{AgentId, ConversationId, VisitorId};

pub struct PersistedIdentity {
    agent_id: AgentId,
    kv: Arc<dyn KeyValueStore>,
    visitor: Mutex<Option<VisitorId>>,
}

impl PersistedIdentity {
    pub fn new(agent_id: AgentId, kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            agent_id,
            kv,
            visitor: Mutex::new(None),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// The stable visitor id, generated and persisted on first use.
    ///
    /// If the store cannot persist it, the generated id still lives for the
    /// rest of this session.
    pub fn visitor_id(&self) -> VisitorId {
        let mut cached = self.visitor.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let key = self.agent_key(StorageField::VisitorId);
        let id = match self.read::<VisitorId>(&key) {
            Some(id) if !id.0.is_empty() => id,
            _ => {
                let id = VisitorId(format!("visitor_{}", uuid::Uuid::new_v4().simple()));
                debug!(visitor_id = %id, "generated visitor id");
                self.write(&key, &id);
                id
            }
        };
        *cached = Some(id.clone());
        id
    }

    /// Timestamp through which the visitor has read the transcript.
    pub fn last_read_at(&self) -> Option<DateTime<Utc>> {
        self.read(&self.agent_key(StorageField::LastReadAt))
    }

    /// Moves the read watermark forward. Older timestamps are ignored.
    pub fn advance_last_read(&self, at: DateTime<Utc>) -> bool {
        if self.last_read_at().is_some_and(|current| current >= at) {
            return false;
        }
        self.write(&self.agent_key(StorageField::LastReadAt), &at)
    }

    /// The conversation to resume when the widget opens again.
    pub fn last_conversation(&self) -> Option<ConversationId> {
        self.read::<ConversationId>(&self.agent_key(StorageField::LastConversation))
            .filter(|id| !id.is_new())
    }

    pub fn remember_conversation(&self, conversation_id: &ConversationId) {
        if conversation_id.is_new() {
            return;
        }
        self.write(
            &self.agent_key(StorageField::LastConversation),
            conversation_id,
        );
    }

    pub fn forget_conversation(&self) {
        let key = self.agent_key(StorageField::LastConversation);
        if let Err(e) = self.kv.remove(&key) {
            warn!(key = %key.render(), error = %e, "failed to clear persisted value");
        }
    }

    /// Whether the "agent joined" notice was already shown for the conversation.
    pub fn notice_shown(&self, conversation_id: &ConversationId) -> bool {
        self.read::<bool>(&self.notice_key(conversation_id))
            .unwrap_or(false)
    }

    pub fn set_notice_shown(&self, conversation_id: &ConversationId, shown: bool) {
        let key = self.notice_key(conversation_id);
        if shown {
            self.write(&key, &true);
        } else if let Err(e) = self.kv.remove(&key) {
            warn!(key = %key.render(), error = %e, "failed to clear persisted value");
        }
    }

    fn agent_key(&self, field: StorageField) -> StorageKey {
        StorageKey::agent(&self.agent_id, field)
    }

    fn notice_key(&self, conversation_id: &ConversationId) -> StorageKey {
        StorageKey::conversation(&self.agent_id, conversation_id, StorageField::NoticeShown)
    }

    fn read<T: DeserializeOwned>(&self, key: &StorageKey) -> Option<T> {
        let raw = match self.kv.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key.render(), error = %e, "failed to read persisted value");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key.render(), error = %e, "discarding corrupt persisted value");
                if let Err(e) = self.kv.remove(key) {
                    warn!(key = %key.render(), error = %e, "failed to clear persisted value");
                }
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &StorageKey, value: &T) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key.render(), error = %e, "failed to encode persisted value");
                return false;
            }
        };
        match self.kv.set(key, &encoded) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key.render(), error = %e, "failed to persist value");
                false
            }
        }
    }
}
