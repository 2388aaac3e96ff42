// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side key/value storage port (browser local storage equivalent).

use strum::{Display, EnumString};

use crate::error::ParleyError;
use crate::traits::adapter::PortAdapter;
use crate::types::{AgentId, ConversationId};

/// Fields the sync core persists on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StorageField {
    VisitorId,
    LastReadAt,
    LastConversation,
    NoticeShown,
}

/// A typed, namespaced storage key.
///
/// Keys are namespaced by agent so several widgets on one origin never share
/// state; conversation-scoped fields also carry the conversation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub namespace: AgentId,
    pub conversation: Option<ConversationId>,
    pub field: StorageField,
}

impl StorageKey {
    /// A key scoped to the agent only.
    pub fn agent(namespace: &AgentId, field: StorageField) -> Self {
        Self {
            namespace: namespace.clone(),
            conversation: None,
            field,
        }
    }

    /// A key scoped to one conversation of the agent.
    pub fn conversation(
        namespace: &AgentId,
        conversation: &ConversationId,
        field: StorageField,
    ) -> Self {
        Self {
            namespace: namespace.clone(),
            conversation: Some(conversation.clone()),
            field,
        }
    }

    /// Flat string form, used by backends that only support string keys.
    pub fn render(&self) -> String {
        match &self.conversation {
            Some(conversation) => format!(
                "parley:{}:{}:{}",
                self.namespace, conversation, self.field
            ),
            None => format!("parley:{}:{}", self.namespace, self.field),
        }
    }
}

/// Synchronous key/value storage.
///
/// Implementations return `Ok(None)` for missing keys. Callers treat
/// unparseable values as absent.
pub trait KeyValueStore: PortAdapter {
    fn get(&self, key: &StorageKey) -> Result<Option<String>, ParleyError>;

    fn set(&self, key: &StorageKey, value: &str) -> Result<(), ParleyError>;

    fn remove(&self, key: &StorageKey) -> Result<(), ParleyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_keys_are_namespaced() {
        let agent = AgentId("acme".into());
        let conv = ConversationId::from("c1");
        assert_eq!(
            StorageKey::agent(&agent, StorageField::VisitorId).render(),
            "parley:acme:visitor_id"
        );
        assert_eq!(
            StorageKey::conversation(&agent, &conv, StorageField::NoticeShown).render(),
            "parley:acme:c1:notice_shown"
        );
    }

    #[test]
    fn different_agents_never_collide() {
        let a = StorageKey::agent(&AgentId("a".into()), StorageField::LastReadAt);
        let b = StorageKey::agent(&AgentId("b".into()), StorageField::LastReadAt);
        assert_ne!(a, b);
        assert_ne!(a.render(), b.render());
    }
}
