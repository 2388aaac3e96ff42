// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime message push handling for the active conversation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use parley_core::traits::RealtimeAdapter;
use parley_core::types::{ConversationId, MessageEvent};

use crate::scope::run_scoped;
use crate::store::{ConversationStore, MergeOutcome};

/// Fallback when a zero capacity slips through.
const MIN_CAPACITY: NonZeroUsize = NonZeroUsize::MIN;

/// What happened to one pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxOutcome {
    /// Event belongs to a conversation that is not active.
    OutOfScope,
    /// An identical event was already applied.
    Duplicate,
    Merged(MergeOutcome),
}

pub struct RealtimeInbox {
    store: Arc<ConversationStore>,
    realtime: Arc<dyn RealtimeAdapter>,
    recent: Mutex<LruCache<String, ()>>,
}

impl RealtimeInbox {
    pub fn new(
        store: Arc<ConversationStore>,
        realtime: Arc<dyn RealtimeAdapter>,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(MIN_CAPACITY);
        Self {
            store,
            realtime,
            recent: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Applies one pushed event to the store.
    pub fn handle_event(&self, event: MessageEvent) -> InboxOutcome {
        if event.conversation_id != self.store.conversation_id() {
            debug!(
                conversation_id = %event.conversation_id,
                message_id = %event.message.id,
                "dropping event for inactive conversation"
            );
            return InboxOutcome::OutOfScope;
        }

        let key = event_key(&event);
        {
            let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
            if recent.put(key, ()).is_some() {
                trace!(message_id = %event.message.id, "duplicate realtime event");
                return InboxOutcome::Duplicate;
            }
        }

        InboxOutcome::Merged(self.store.merge_remote(event.message))
    }

    /// Follows the active conversation until cancelled.
    ///
    /// The subscription is recreated whenever the conversation id changes;
    /// the sentinel id has none.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let scope = self.store.watch_conversation();
        run_scoped(scope, cancel, |conversation_id: ConversationId| {
            let inbox = self.clone();
            async move { inbox.follow(conversation_id).await }
        })
        .await;
    }

    async fn follow(&self, conversation_id: ConversationId) {
        if conversation_id.is_new() {
            return;
        }

        let mut subscription = match self.realtime.subscribe_messages(&conversation_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "message subscription failed");
                return;
            }
        };
        debug!(conversation_id = %conversation_id, "message subscription established");

        while let Some(event) = subscription.recv().await {
            self.handle_event(event);
        }
        debug!(conversation_id = %conversation_id, "message subscription closed");
    }
}

/// Dedup key: the stream chunk id when present, otherwise the event kind,
/// message id and a hash of the mutable fields.
fn event_key(event: &MessageEvent) -> String {
    if let Some(chunk) = &event.chunk_id {
        return format!("chunk:{chunk}");
    }

    let message = &event.message;
    let mut hasher = DefaultHasher::new();
    message.content.hash(&mut hasher);
    message.read_at.hash(&mut hasher);
    message.reaction.hash(&mut hasher);
    message.sender_name.hash(&mut hasher);
    message.attachments.len().hash(&mut hasher);
    format!("{}:{}:{:016x}", event.kind, message.id, hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{MessageEventKind, RemoteMessage, Role};
    use parley_test_utils::InMemoryRealtime;

    fn inbox(capacity: usize) -> (RealtimeInbox, Arc<ConversationStore>) {
        let store = Arc::new(ConversationStore::new());
        store.promote_conversation(&ConversationId::from("c1"));
        let inbox = RealtimeInbox::new(store.clone(), Arc::new(InMemoryRealtime::new()), capacity);
        (inbox, store)
    }

    fn event(conversation: &str, id: &str, content: &str) -> MessageEvent {
        MessageEvent {
            kind: MessageEventKind::Insert,
            conversation_id: ConversationId::from(conversation),
            message: RemoteMessage::text(id, Role::Assistant, content),
            chunk_id: None,
        }
    }

    #[test]
    fn out_of_scope_events_dropped() {
        let (inbox, store) = inbox(8);
        assert_eq!(
            inbox.handle_event(event("c0", "a1", "late")),
            InboxOutcome::OutOfScope
        );
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn repeated_event_collapses() {
        let (inbox, store) = inbox(8);
        let e = event("c1", "a1", "Hello");
        assert_eq!(
            inbox.handle_event(e.clone()),
            InboxOutcome::Merged(MergeOutcome::Appended)
        );
        assert_eq!(inbox.handle_event(e), InboxOutcome::Duplicate);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn changed_content_is_not_a_duplicate() {
        let (inbox, store) = inbox(8);
        inbox.handle_event(event("c1", "a1", "Hel"));
        let mut update = event("c1", "a1", "Hello");
        update.kind = MessageEventKind::Update;
        assert_eq!(
            inbox.handle_event(update),
            InboxOutcome::Merged(MergeOutcome::Updated)
        );
        assert_eq!(store.snapshot().messages[0].content, "Hello");
    }

    #[test]
    fn chunk_id_keys_partial_pushes() {
        let (inbox, _) = inbox(8);
        let mut first = event("c1", "a1", "Hel");
        first.chunk_id = Some("chunk-1".into());
        let mut repeat = event("c1", "a1", "Hel");
        repeat.chunk_id = Some("chunk-1".into());
        inbox.handle_event(first);
        assert_eq!(inbox.handle_event(repeat), InboxOutcome::Duplicate);
    }

    #[test]
    fn eviction_still_converges_through_store() {
        let (inbox, store) = inbox(1);
        inbox.handle_event(event("c1", "a1", "one"));
        inbox.handle_event(event("c1", "a2", "two"));
        // a1's key was evicted; the store still dedups by id.
        assert_eq!(
            inbox.handle_event(event("c1", "a1", "one")),
            InboxOutcome::Merged(MergeOutcome::Updated)
        );
        assert_eq!(store.snapshot().len(), 2);
    }
}
