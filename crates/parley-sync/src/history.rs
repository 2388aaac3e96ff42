// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Guarded full-transcript fetch for resumed or switched conversations.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::traits::BackendAdapter;
use parley_core::types::ConversationId;

use crate::store::{ConversationStore, FetchRejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The conversation has no server id yet.
    Sentinel,
    /// The transcript is already authoritative in memory.
    AlreadyFetched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Skipped(SkipReason),
    Applied { count: usize },
    Rejected(FetchRejection),
    Failed(String),
}

pub struct HistoryLoader {
    store: Arc<ConversationStore>,
    backend: Arc<dyn BackendAdapter>,
}

impl HistoryLoader {
    pub fn new(store: Arc<ConversationStore>, backend: Arc<dyn BackendAdapter>) -> Self {
        Self { store, backend }
    }

    /// Fetches and merges the transcript of `conversation_id`.
    ///
    /// A failed or rejected load gives its fetched-set claim back so a later
    /// load can try again.
    pub async fn load(&self, conversation_id: &ConversationId) -> LoadOutcome {
        if conversation_id.is_new() {
            return LoadOutcome::Skipped(SkipReason::Sentinel);
        }
        if !self.store.claim_fetch(conversation_id) {
            debug!(conversation_id = %conversation_id, "transcript already loaded");
            return LoadOutcome::Skipped(SkipReason::AlreadyFetched);
        }

        let messages = match self.backend.fetch_messages(conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "history fetch failed");
                self.store.release_fetch(conversation_id);
                return LoadOutcome::Failed(e.to_string());
            }
        };

        match self.store.apply_fetched(conversation_id, messages) {
            Ok(count) => {
                info!(conversation_id = %conversation_id, count, "history loaded");
                LoadOutcome::Applied { count }
            }
            Err(rejection) => {
                self.store.release_fetch(conversation_id);
                LoadOutcome::Rejected(rejection)
            }
        }
    }

    /// Reloads the active conversation whenever sending goes idle and its
    /// transcript is not yet authoritative.
    ///
    /// Covers loads that were rejected because a send was in flight.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut sending = self.store.watch_sending();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = sending.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *sending.borrow_and_update() > 0 {
                        continue;
                    }
                    let conversation_id = self.store.conversation_id();
                    if conversation_id.is_new() || self.store.is_fetched(&conversation_id) {
                        continue;
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        outcome = self.load(&conversation_id) => {
                            debug!(conversation_id = %conversation_id, outcome = ?outcome, "deferred history load");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{RemoteMessage, Role};
    use parley_test_utils::MockBackend;

    fn loader() -> (HistoryLoader, Arc<ConversationStore>, Arc<MockBackend>) {
        let store = Arc::new(ConversationStore::new());
        let backend = Arc::new(MockBackend::new());
        (
            HistoryLoader::new(store.clone(), backend.clone()),
            store,
            backend,
        )
    }

    #[tokio::test]
    async fn sentinel_is_skipped() {
        let (loader, _, backend) = loader();
        assert_eq!(
            loader.load(&ConversationId::sentinel()).await,
            LoadOutcome::Skipped(SkipReason::Sentinel)
        );
        assert_eq!(backend.fetch_count(), 0);
    }

    #[tokio::test]
    async fn loads_once_per_conversation() {
        let (loader, store, backend) = loader();
        let conv = ConversationId::from("c1");
        backend.set_messages(
            &conv,
            vec![
                RemoteMessage::text("a1", Role::Assistant, "Welcome"),
                RemoteMessage::text("v1", Role::Visitor, "Hi"),
            ],
        );
        store.replace_all(conv.clone(), Vec::new()).unwrap();

        assert_eq!(loader.load(&conv).await, LoadOutcome::Applied { count: 2 });
        assert_eq!(
            loader.load(&conv).await,
            LoadOutcome::Skipped(SkipReason::AlreadyFetched)
        );
        assert_eq!(backend.fetch_count(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn failure_releases_claim() {
        let (loader, store, backend) = loader();
        let conv = ConversationId::from("c1");
        store.replace_all(conv.clone(), Vec::new()).unwrap();
        backend.set_offline(true);

        assert!(matches!(loader.load(&conv).await, LoadOutcome::Failed(_)));
        assert!(!store.is_fetched(&conv));

        backend.set_offline(false);
        assert_eq!(loader.load(&conv).await, LoadOutcome::Applied { count: 0 });
    }

    #[tokio::test]
    async fn rejected_load_retries_when_sends_drain() {
        let store = Arc::new(ConversationStore::new());
        let backend = Arc::new(MockBackend::new());
        let loader = Arc::new(HistoryLoader::new(store.clone(), backend.clone()));
        let conv = ConversationId::from("c1");
        backend.set_messages(&conv, vec![RemoteMessage::text("a1", Role::Assistant, "Welcome")]);
        store.replace_all(conv.clone(), Vec::new()).unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(loader.clone().run(cancel.clone()));
        tokio::task::yield_now().await;

        let guard = store.begin_send();
        assert_eq!(
            loader.load(&conv).await,
            LoadOutcome::Rejected(FetchRejection::SendInFlight)
        );
        assert!(store.snapshot().is_empty());

        drop(guard);
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.fetch_count(), 2);
        assert!(store.is_fetched(&conv));
        assert_eq!(store.snapshot().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn idle_sends_skip_fetched_conversation() {
        let store = Arc::new(ConversationStore::new());
        let backend = Arc::new(MockBackend::new());
        let loader = Arc::new(HistoryLoader::new(store.clone(), backend.clone()));
        store.promote_conversation(&ConversationId::from("c1"));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(loader.run(cancel.clone()));
        tokio::task::yield_now().await;

        drop(store.begin_send());
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.fetch_count(), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stale_result_is_rejected() {
        let (loader, store, _) = loader();
        store.replace_all(ConversationId::from("c2"), Vec::new()).unwrap();
        assert_eq!(
            loader.load(&ConversationId::from("c1")).await,
            LoadOutcome::Rejected(FetchRejection::StaleConversation)
        );
        assert!(!store.is_fetched(&ConversationId::from("c1")));
    }
}
