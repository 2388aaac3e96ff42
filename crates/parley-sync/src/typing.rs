// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator typing indicator with client-side expiry, and the visitor's own
//! typing announcements.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use parley_core::traits::RealtimeAdapter;
use parley_core::types::{ConversationId, TypingEvent};

use crate::scope::run_scoped;
use crate::store::ConversationStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingState {
    pub is_typing: bool,
    pub agent_name: Option<String>,
}

pub struct TypingSignal {
    store: Arc<ConversationStore>,
    realtime: Arc<dyn RealtimeAdapter>,
    timeout: Duration,
    state: watch::Sender<TypingState>,
}

impl TypingSignal {
    pub fn new(
        store: Arc<ConversationStore>,
        realtime: Arc<dyn RealtimeAdapter>,
        timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(TypingState::default());
        Self {
            store,
            realtime,
            timeout,
            state,
        }
    }

    pub fn current(&self) -> TypingState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TypingState> {
        self.state.subscribe()
    }

    /// Announces the visitor's typing state. Fire-and-forget.
    pub async fn publish_visitor_typing(&self, is_typing: bool) {
        let conversation_id = self.store.conversation_id();
        if conversation_id.is_new() {
            return;
        }
        let event = TypingEvent {
            conversation_id,
            is_typing,
            agent_name: None,
        };
        if let Err(e) = self.realtime.publish_typing(event).await {
            debug!(error = %e, "visitor typing publish failed");
        }
    }

    fn clear(&self) {
        self.state.send_if_modified(|state| {
            let changed = state.is_typing;
            *state = TypingState::default();
            changed
        });
    }

    /// Follows operator typing for the active conversation until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let scope = self.store.watch_conversation();
        run_scoped(scope, cancel, |conversation_id: ConversationId| {
            let signal = self.clone();
            async move { signal.follow(conversation_id).await }
        })
        .await;
        self.clear();
    }

    async fn follow(&self, conversation_id: ConversationId) {
        self.clear();
        if conversation_id.is_new() {
            return;
        }

        let mut subscription = match self.realtime.subscribe_typing(&conversation_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "typing subscription failed");
                return;
            }
        };

        let mut deadline: Option<Instant> = None;
        loop {
            let expiry = deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                event = subscription.recv() => {
                    let Some(event) = event else { break };
                    if event.conversation_id != conversation_id {
                        continue;
                    }
                    if event.is_typing {
                        trace!(agent = ?event.agent_name, "operator typing");
                        self.state.send_replace(TypingState {
                            is_typing: true,
                            agent_name: event.agent_name,
                        });
                        deadline = Some(Instant::now() + self.timeout);
                    } else {
                        self.clear();
                        deadline = None;
                    }
                }
                _ = sleep_until(expiry), if deadline.is_some() => {
                    trace!("typing indicator expired");
                    self.clear();
                    deadline = None;
                }
            }
        }
        self.clear();
    }
}
