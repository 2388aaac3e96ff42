// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation store: sole owner of the transcript.
//!
//! Every path that can introduce a server message (send response, realtime
//! push, history fetch) goes through [`ConversationStore::merge_remote`] or
//! [`ConversationStore::reconcile`], which together guarantee that a logical
//! message is stored at most once.
//!
//! Mutations are synchronous closures run under the watch channel's write
//! lock. They never span an `.await`, so no other task can observe a
//! half-applied change.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use parley_core::ParleyError;
use parley_core::types::{
    Attachment, ConversationId, LocalId, Message, MessageId, MessageKind, Reaction,
    RemoteMessage, Role,
};

/// Published view of the conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn find_by_id(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id.as_ref() == Some(id))
    }

    pub fn find_by_local(&self, local_id: LocalId) -> Option<&Message> {
        self.messages.iter().find(|m| m.local_id == Some(local_id))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Content of an optimistic visitor message.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundDraft {
    pub content: String,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
}

impl OutboundDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
        }
    }
}

/// Server fields applied when an optimistic row is reconciled.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePatch {
    pub created_at: Option<DateTime<Utc>>,
}

/// What [`ConversationStore::merge_remote`] did with a server record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A row with the same server id was updated in place.
    Updated,
    /// An unacknowledged row with matching role and content took the id.
    Claimed,
    /// No match; the record was appended.
    Appended,
}

/// Why a full-transcript fetch result was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRejection {
    /// A send was in flight when the result arrived.
    SendInFlight,
    /// The active conversation changed while the fetch was running.
    StaleConversation,
}

/// Counted guard marking a send as in flight. Released on drop.
#[derive(Debug)]
pub struct SendGuard {
    sending: Arc<watch::Sender<usize>>,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.sending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Owner of the ordered message list and the active conversation id.
pub struct ConversationStore {
    transcript: watch::Sender<Transcript>,
    conversation: watch::Sender<ConversationId>,
    /// Conversations whose transcript is already authoritative in memory.
    fetched: Mutex<HashSet<ConversationId>>,
    /// Number of sends in flight.
    sending: Arc<watch::Sender<usize>>,
    next_local: AtomicU64,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Creates an empty store on the `"new"` sentinel conversation.
    pub fn new() -> Self {
        let (transcript, _) = watch::channel(Transcript::default());
        let (conversation, _) = watch::channel(ConversationId::sentinel());
        Self {
            transcript,
            conversation,
            fetched: Mutex::new(HashSet::new()),
            sending: Arc::new(watch::channel(0).0),
            next_local: AtomicU64::new(1),
        }
    }

    /// Clone of the current transcript.
    pub fn snapshot(&self) -> Transcript {
        self.transcript.borrow().clone()
    }

    /// Receiver notified after every transcript mutation.
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.transcript.subscribe()
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation.borrow().clone()
    }

    /// Receiver notified when the active conversation id changes.
    ///
    /// Scoped subscriptions (inbox, status, typing) key off this channel.
    pub fn watch_conversation(&self) -> watch::Receiver<ConversationId> {
        self.conversation.subscribe()
    }

    /// Marks a send as in flight until the returned guard is dropped.
    pub fn begin_send(&self) -> SendGuard {
        self.sending.send_modify(|n| *n += 1);
        SendGuard {
            sending: self.sending.clone(),
        }
    }

    pub fn is_sending(&self) -> bool {
        *self.sending.borrow() > 0
    }

    /// Receiver of the in-flight send count; it reads `0` once every guard
    /// has dropped.
    pub fn watch_sending(&self) -> watch::Receiver<usize> {
        self.sending.subscribe()
    }

    fn with_fetched<R>(&self, f: impl FnOnce(&mut HashSet<ConversationId>) -> R) -> R {
        let mut fetched = self.fetched.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut fetched)
    }

    pub fn is_fetched(&self, conversation_id: &ConversationId) -> bool {
        self.with_fetched(|set| set.contains(conversation_id))
    }

    /// Reserves a full-transcript fetch for `conversation_id`.
    ///
    /// Returns `false` for the sentinel and for ids already fetched, in which
    /// case the caller must not fetch.
    pub fn claim_fetch(&self, conversation_id: &ConversationId) -> bool {
        if conversation_id.is_new() {
            return false;
        }
        self.with_fetched(|set| set.insert(conversation_id.clone()))
    }

    /// Gives back a claim whose fetch failed or was rejected.
    pub fn release_fetch(&self, conversation_id: &ConversationId) {
        self.with_fetched(|set| set.remove(conversation_id));
    }

    /// Adopts a backend-assigned conversation id.
    ///
    /// The id is recorded as fetched before it is published, so no observer
    /// of the new id can start a full fetch that would overwrite rows still
    /// waiting for reconciliation. Returns `false` if the id was already
    /// active.
    pub fn promote_conversation(&self, conversation_id: &ConversationId) -> bool {
        if *self.conversation.borrow() == *conversation_id {
            return false;
        }

        self.with_fetched(|set| set.insert(conversation_id.clone()));
        self.transcript.send_modify(|t| {
            t.conversation_id = conversation_id.clone();
        });
        self.conversation.send_replace(conversation_id.clone());

        info!(conversation_id = %conversation_id, "conversation id promoted");
        true
    }

    /// Inserts an unacknowledged visitor message at the tail.
    pub fn append_optimistic(&self, draft: OutboundDraft) -> LocalId {
        let local_id = LocalId(self.next_local.fetch_add(1, Ordering::SeqCst));
        let message = Message::outbound(local_id, draft.content, draft.kind, draft.attachments);
        self.transcript.send_modify(|t| t.messages.push(message));
        trace!(local_id = %local_id, "optimistic message appended");
        local_id
    }

    /// Attaches the server id to the optimistic row identified by `local_id`.
    ///
    /// Never inserts. If a realtime echo already attached `server_id` to a
    /// different row by content match, that claim moves here and the other
    /// row returns to pending; an appended duplicate row is removed.
    pub fn reconcile(&self, local_id: LocalId, server_id: &MessageId, patch: ReconcilePatch) -> bool {
        self.transcript.send_if_modified(|t| {
            let Some(target) = t
                .messages
                .iter()
                .rposition(|m| m.local_id == Some(local_id))
            else {
                debug!(local_id = %local_id, "reconcile target not found");
                return false;
            };

            let other = t
                .messages
                .iter()
                .enumerate()
                .find(|(i, m)| *i != target && m.id.as_ref() == Some(server_id))
                .map(|(i, _)| i);

            let mut target = target;
            if let Some(other) = other {
                if t.messages[other].local_id.is_some() {
                    // Heuristic claim landed on a sibling send with equal content.
                    let sibling = &mut t.messages[other];
                    sibling.id = None;
                    sibling.provisional_id = false;
                    debug!(local_id = %local_id, "moved provisional claim to reconciled row");
                } else {
                    let duplicate = t.messages.remove(other);
                    if other < target {
                        target -= 1;
                    }
                    let row = &mut t.messages[target];
                    if row.read_at.is_none() {
                        row.read_at = duplicate.read_at;
                    }
                    debug!(local_id = %local_id, "dropped duplicate echo row");
                }
            }

            let row = &mut t.messages[target];
            row.id = Some(server_id.clone());
            row.provisional_id = false;
            row.failed = false;
            if let Some(created_at) = patch.created_at {
                row.created_at = created_at;
            }
            true
        })
    }

    /// Merges a server record into the transcript.
    ///
    /// Matching order: server id equality, then the oldest unacknowledged
    /// row with the same role and content, then append.
    pub fn merge_remote(&self, remote: RemoteMessage) -> MergeOutcome {
        let mut outcome = MergeOutcome::Appended;
        self.transcript.send_modify(|t| {
            if let Some(row) = t.messages.iter_mut().find(|m| m.id.as_ref() == Some(&remote.id)) {
                apply_remote_fields(row, &remote);
                outcome = MergeOutcome::Updated;
                return;
            }

            if let Some(row) = t.messages.iter_mut().find(|m| {
                m.is_unresolved() && m.role == remote.role && m.content == remote.content
            }) {
                row.id = Some(remote.id.clone());
                row.provisional_id = row.local_id.is_some();
                apply_remote_fields(row, &remote);
                outcome = MergeOutcome::Claimed;
                return;
            }

            t.messages.push(Message::from(remote));
        });
        trace!(outcome = ?outcome, "remote message merged");
        outcome
    }

    /// Appends an assistant reply the backend returned without a message id.
    ///
    /// The row stays claimable, so a later realtime echo of the same reply
    /// attaches to it instead of duplicating it.
    pub fn append_unacknowledged_reply(&self, content: impl Into<String>) {
        let message = Message {
            is_system_notice: false,
            ..Message::system_notice(content)
        };
        self.transcript.send_modify(|t| t.messages.push(message));
    }

    /// Marks the optimistic row as failed. Other rows are untouched.
    pub fn mark_failed(&self, local_id: LocalId) -> bool {
        self.transcript.send_if_modified(|t| {
            match t
                .messages
                .iter_mut()
                .rfind(|m| m.local_id == Some(local_id) && m.id.is_none())
            {
                Some(row) => {
                    row.failed = true;
                    true
                }
                None => false,
            }
        })
    }

    /// Appends a synthetic, non-persisted notice.
    pub fn inject_system_notice(&self, notice: Message) {
        debug_assert!(notice.is_system_notice);
        self.transcript.send_modify(|t| t.messages.push(notice));
    }

    /// Sets the visitor's reaction on a message, returning the previous one.
    pub fn set_reaction(
        &self,
        message_id: &MessageId,
        reaction: Option<Reaction>,
    ) -> Result<Option<Reaction>, ParleyError> {
        let mut previous = None;
        let found = self.transcript.send_if_modified(|t| {
            match t.messages.iter_mut().find(|m| m.id.as_ref() == Some(message_id)) {
                Some(row) => {
                    previous = std::mem::replace(&mut row.reaction, reaction);
                    true
                }
                None => false,
            }
        });
        if found {
            Ok(previous)
        } else {
            Err(ParleyError::MessageNotFound(message_id.to_string()))
        }
    }

    /// Replaces the whole transcript on an explicit conversation switch.
    ///
    /// Refused while a send is in flight. The id leaves the fetched set, so
    /// a history load for it may follow.
    pub fn replace_all(
        &self,
        conversation_id: ConversationId,
        messages: Vec<Message>,
    ) -> Result<(), ParleyError> {
        if self.is_sending() {
            return Err(ParleyError::SendInFlight);
        }

        let changed = *self.conversation.borrow() != conversation_id;
        self.with_fetched(|set| set.remove(&conversation_id));
        self.transcript.send_replace(Transcript {
            conversation_id: conversation_id.clone(),
            messages,
        });
        if changed {
            self.conversation.send_replace(conversation_id.clone());
            info!(conversation_id = %conversation_id, "switched conversation");
        }
        Ok(())
    }

    /// Applies the result of a full-transcript fetch.
    ///
    /// Rejected while a send is in flight or when the fetched conversation
    /// is no longer active. Accepted records are merged one by one, so rows
    /// that exist only locally (pending, failed, notices) survive.
    pub fn apply_fetched(
        &self,
        conversation_id: &ConversationId,
        messages: Vec<RemoteMessage>,
    ) -> Result<usize, FetchRejection> {
        if self.is_sending() {
            debug!(conversation_id = %conversation_id, "send in flight, fetched transcript ignored");
            return Err(FetchRejection::SendInFlight);
        }
        if *self.conversation.borrow() != *conversation_id {
            debug!(conversation_id = %conversation_id, "stale fetched transcript ignored");
            return Err(FetchRejection::StaleConversation);
        }

        let count = messages.len();
        for message in messages {
            self.merge_remote(message);
        }
        Ok(count)
    }

    /// Stamps `read_at` on assistant rows created at or before `through`.
    pub fn mark_read_through(&self, through: DateTime<Utc>) -> usize {
        let mut marked = 0;
        self.transcript.send_if_modified(|t| {
            for row in t.messages.iter_mut().filter(|m| {
                m.role == Role::Assistant
                    && m.id.is_some()
                    && m.read_at.is_none()
                    && m.created_at <= through
            }) {
                row.read_at = Some(through);
                marked += 1;
            }
            marked > 0
        });
        marked
    }

    /// Assistant messages newer than the watermark.
    pub fn unread_count(&self, watermark: Option<DateTime<Utc>>) -> usize {
        self.transcript
            .borrow()
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant && !m.is_system_notice)
            .filter(|m| watermark.is_none_or(|w| m.created_at > w))
            .count()
    }

    /// Timestamp of the newest assistant message, if any.
    pub fn latest_assistant_at(&self) -> Option<DateTime<Utc>> {
        self.transcript
            .borrow()
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant && !m.is_system_notice)
            .map(|m| m.created_at)
            .max()
    }
}

fn apply_remote_fields(row: &mut Message, remote: &RemoteMessage) {
    row.content.clone_from(&remote.content);
    row.kind = remote.kind;
    if !remote.attachments.is_empty() {
        row.attachments.clone_from(&remote.attachments);
    }
    row.created_at = remote.created_at;
    if remote.read_at.is_some() {
        row.read_at = remote.read_at;
    }
    if remote.sender_name.is_some() {
        row.sender_name.clone_from(&remote.sender_name);
    }
    if remote.sender_avatar.is_some() {
        row.sender_avatar.clone_from(&remote.sender_avatar);
    }
    if remote.reaction.is_some() {
        row.reaction = remote.reaction;
    }
    row.failed = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::DeliveryState;

    fn visitor(id: &str, content: &str) -> RemoteMessage {
        RemoteMessage::text(id, Role::Visitor, content)
    }

    fn assistant(id: &str, content: &str) -> RemoteMessage {
        RemoteMessage::text(id, Role::Assistant, content)
    }

    #[test]
    fn optimistic_then_reconcile_resolves_single_row() {
        let store = ConversationStore::new();
        let local = store.append_optimistic(OutboundDraft::text("Hi"));
        assert_eq!(
            store.snapshot().messages[0].delivery_state(),
            DeliveryState::Pending
        );

        assert!(store.reconcile(local, &MessageId::from("m1"), ReconcilePatch::default()));

        let t = store.snapshot();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages[0].id, Some(MessageId::from("m1")));
        assert_eq!(t.messages[0].delivery_state(), DeliveryState::Sent);
    }

    #[test]
    fn reconcile_unknown_local_id_never_inserts() {
        let store = ConversationStore::new();
        assert!(!store.reconcile(LocalId(99), &MessageId::from("m1"), ReconcilePatch::default()));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn echo_before_response_converges() {
        let store = ConversationStore::new();
        let local = store.append_optimistic(OutboundDraft::text("Hi"));

        assert_eq!(store.merge_remote(visitor("m1", "Hi")), MergeOutcome::Claimed);
        assert!(store.reconcile(local, &MessageId::from("m1"), ReconcilePatch::default()));
        assert_eq!(store.merge_remote(visitor("m1", "Hi")), MergeOutcome::Updated);

        let t = store.snapshot();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages[0].local_id, Some(local));
        assert!(!t.messages[0].provisional_id);
    }

    #[test]
    fn echo_after_response_updates_in_place() {
        let store = ConversationStore::new();
        let local = store.append_optimistic(OutboundDraft::text("Hi"));
        store.reconcile(local, &MessageId::from("m1"), ReconcilePatch::default());

        assert_eq!(store.merge_remote(visitor("m1", "Hi")), MergeOutcome::Updated);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn identical_rapid_sends_converge_to_distinct_ids() {
        let store = ConversationStore::new();
        let first = store.append_optimistic(OutboundDraft::text("ok"));
        let second = store.append_optimistic(OutboundDraft::text("ok"));

        // The echo for the second send arrives first and is claimed by the
        // oldest matching row.
        store.merge_remote(visitor("m2", "ok"));
        store.reconcile(second, &MessageId::from("m2"), ReconcilePatch::default());
        store.reconcile(first, &MessageId::from("m1"), ReconcilePatch::default());
        store.merge_remote(visitor("m1", "ok"));

        let t = store.snapshot();
        assert_eq!(t.len(), 2);
        assert_eq!(t.find_by_local(first).unwrap().id, Some(MessageId::from("m1")));
        assert_eq!(t.find_by_local(second).unwrap().id, Some(MessageId::from("m2")));
    }

    #[test]
    fn reconcile_removes_unmatched_echo_duplicate() {
        let store = ConversationStore::new();
        let local = store.append_optimistic(OutboundDraft::text("Hi"));
        // Server normalised the content, so the heuristic could not match.
        store.merge_remote(visitor("m1", "Hi "));
        assert_eq!(store.snapshot().len(), 2);

        store.reconcile(local, &MessageId::from("m1"), ReconcilePatch::default());
        let t = store.snapshot();
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages[0].local_id, Some(local));
    }

    #[test]
    fn mark_failed_touches_only_that_row() {
        let store = ConversationStore::new();
        let ok = store.append_optimistic(OutboundDraft::text("first"));
        store.reconcile(ok, &MessageId::from("m1"), ReconcilePatch::default());
        let bad = store.append_optimistic(OutboundDraft::text("second"));

        assert!(store.mark_failed(bad));
        let t = store.snapshot();
        assert_eq!(t.messages[0].delivery_state(), DeliveryState::Sent);
        assert_eq!(t.messages[1].delivery_state(), DeliveryState::Failed);
    }

    #[test]
    fn failed_rows_are_not_claimed_by_echo() {
        let store = ConversationStore::new();
        let bad = store.append_optimistic(OutboundDraft::text("Hi"));
        store.mark_failed(bad);

        assert_eq!(store.merge_remote(visitor("m9", "Hi")), MergeOutcome::Appended);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn promotion_marks_fetched_before_publishing() {
        let store = ConversationStore::new();
        let mut rx = store.watch_conversation();
        let conv = ConversationId::from("c1");

        assert!(store.promote_conversation(&conv));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), conv);
        assert!(store.is_fetched(&conv));
        assert!(!store.claim_fetch(&conv));
        assert!(!store.promote_conversation(&conv));
    }

    #[test]
    fn replace_all_refused_while_sending() {
        let store = ConversationStore::new();
        let guard = store.begin_send();
        let err = store
            .replace_all(ConversationId::from("c2"), Vec::new())
            .unwrap_err();
        assert!(matches!(err, ParleyError::SendInFlight));

        drop(guard);
        assert!(store.replace_all(ConversationId::from("c2"), Vec::new()).is_ok());
        assert_eq!(store.conversation_id(), ConversationId::from("c2"));
    }

    #[test]
    fn fetched_transcript_rejected_during_send() {
        let store = ConversationStore::new();
        let conv = ConversationId::from("c1");
        store.promote_conversation(&conv);
        let _guard = store.begin_send();
        store.append_optimistic(OutboundDraft::text("Hi"));

        assert_eq!(
            store.apply_fetched(&conv, vec![assistant("a0", "Welcome")]),
            Err(FetchRejection::SendInFlight)
        );
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn fetched_transcript_for_stale_conversation_rejected() {
        let store = ConversationStore::new();
        store.promote_conversation(&ConversationId::from("c1"));
        assert_eq!(
            store.apply_fetched(&ConversationId::from("c0"), vec![assistant("a0", "old")]),
            Err(FetchRejection::StaleConversation)
        );
    }

    #[test]
    fn fetched_transcript_keeps_local_only_rows() {
        let store = ConversationStore::new();
        let conv = ConversationId::from("c1");
        store.replace_all(conv.clone(), Vec::new()).unwrap();
        store.inject_system_notice(Message::system_notice("Dana has joined the conversation"));

        let applied = store
            .apply_fetched(&conv, vec![assistant("a1", "Hello"), visitor("v1", "Hi")])
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn reaction_set_and_reported() {
        let store = ConversationStore::new();
        store.merge_remote(assistant("a1", "Answer"));
        let id = MessageId::from("a1");

        assert_eq!(store.set_reaction(&id, Some(Reaction::ThumbsUp)).unwrap(), None);
        assert_eq!(
            store.set_reaction(&id, None).unwrap(),
            Some(Reaction::ThumbsUp)
        );
        assert!(store.set_reaction(&MessageId::from("zz"), None).is_err());
    }

    #[test]
    fn unacknowledged_reply_is_claimed_by_echo() {
        let store = ConversationStore::new();
        store.append_unacknowledged_reply("Sure!");
        assert_eq!(store.merge_remote(assistant("a1", "Sure!")), MergeOutcome::Claimed);
        let t = store.snapshot();
        assert_eq!(t.len(), 1);
        assert!(!t.messages[0].provisional_id);
    }

    #[test]
    fn unread_count_uses_watermark() {
        let store = ConversationStore::new();
        let mut old = assistant("a1", "old");
        old.created_at = Utc::now() - chrono::Duration::minutes(10);
        store.merge_remote(old);
        store.merge_remote(assistant("a2", "new"));
        store.inject_system_notice(Message::system_notice("notice"));

        assert_eq!(store.unread_count(None), 2);
        let watermark = Utc::now() - chrono::Duration::minutes(5);
        assert_eq!(store.unread_count(Some(watermark)), 1);
    }

    #[test]
    fn mark_read_through_stamps_older_assistant_rows() {
        let store = ConversationStore::new();
        let mut old = assistant("a1", "old");
        old.created_at = Utc::now() - chrono::Duration::minutes(1);
        store.merge_remote(old);
        store.merge_remote(visitor("v1", "hi"));

        assert_eq!(store.mark_read_through(Utc::now()), 1);
        assert_eq!(store.mark_read_through(Utc::now()), 0);
        let t = store.snapshot();
        assert!(t.find_by_id(&MessageId::from("a1")).unwrap().read_at.is_some());
        assert!(t.find_by_id(&MessageId::from("v1")).unwrap().read_at.is_none());
    }

    #[test]
    fn send_guard_is_counted() {
        let store = ConversationStore::new();
        let a = store.begin_send();
        let b = store.begin_send();
        drop(a);
        assert!(store.is_sending());
        drop(b);
        assert!(!store.is_sending());
    }

    #[test]
    fn last_guard_drop_notifies_watchers() {
        let store = ConversationStore::new();
        let mut sending = store.watch_sending();
        let a = store.begin_send();
        let b = store.begin_send();
        assert_eq!(*sending.borrow_and_update(), 2);

        drop(a);
        assert_eq!(*sending.borrow_and_update(), 1);
        drop(b);
        assert!(sending.has_changed().unwrap());
        assert_eq!(*sending.borrow_and_update(), 0);
    }

    #[test]
    fn subscribers_see_mutations() {
        let store = ConversationStore::new();
        let mut rx = store.subscribe();
        store.append_optimistic(OutboundDraft::text("Hi"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }
}
