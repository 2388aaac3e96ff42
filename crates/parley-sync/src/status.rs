// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation ownership tracking: AI, human takeover, closed.
//!
//! [`StatusMachine`] holds the transition rules and is free of I/O.
//! [`StatusMonitor`] feeds it from the realtime status channel and carries
//! out the resulting effects.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::traits::{BackendAdapter, RealtimeAdapter};
use parley_core::types::{ConversationId, ConversationStatus, Message};

use crate::events::WidgetEvent;
use crate::identity::PersistedIdentity;
use crate::scope::run_scoped;
use crate::store::ConversationStore;

/// Side effect requested by a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffect {
    /// Show the "agent joined" notice and set the persisted flag.
    AnnounceAgent,
    /// Clear the persisted notice flag.
    ClearNoticeFlag,
    /// Tell the embedding application the conversation was closed.
    ConversationClosed,
    /// A closed conversation became active again.
    Reopened,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ConversationStatus,
    pub to: ConversationStatus,
    pub effects: Vec<StatusEffect>,
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.effects.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct StatusMachine {
    state: ConversationStatus,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConversationStatus {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ConversationStatus::Ai;
    }

    /// Moves to `next` and returns the effects the move requires.
    ///
    /// `notice_shown` is the persisted per-conversation flag; it suppresses a
    /// second announcement after a reload and drives flag cleanup.
    pub fn apply(&mut self, next: ConversationStatus, notice_shown: bool) -> Transition {
        use ConversationStatus::{Ai, Closed, HumanTakeover};

        let from = self.state;
        let mut effects = Vec::new();

        match (from, next) {
            (Ai, Ai) if notice_shown => effects.push(StatusEffect::ClearNoticeFlag),
            (a, b) if a == b => {}
            (_, HumanTakeover) => {
                if from == Closed {
                    effects.push(StatusEffect::Reopened);
                }
                if !notice_shown {
                    effects.push(StatusEffect::AnnounceAgent);
                }
            }
            (_, Ai) => {
                if from == Closed {
                    effects.push(StatusEffect::Reopened);
                }
                if notice_shown {
                    effects.push(StatusEffect::ClearNoticeFlag);
                }
            }
            (_, Closed) => effects.push(StatusEffect::ConversationClosed),
        }

        self.state = next;
        Transition {
            from,
            to: next,
            effects,
        }
    }
}

/// Notice text shown when a human agent takes over.
pub fn join_notice(agent_name: &str) -> String {
    format!("{agent_name} has joined the conversation")
}

pub struct StatusMonitor {
    store: Arc<ConversationStore>,
    backend: Arc<dyn BackendAdapter>,
    realtime: Arc<dyn RealtimeAdapter>,
    identity: Arc<PersistedIdentity>,
    placeholder_name: String,
    machine: Mutex<StatusMachine>,
    status: watch::Sender<ConversationStatus>,
    events: broadcast::Sender<WidgetEvent>,
}

impl StatusMonitor {
    pub fn new(
        store: Arc<ConversationStore>,
        backend: Arc<dyn BackendAdapter>,
        realtime: Arc<dyn RealtimeAdapter>,
        identity: Arc<PersistedIdentity>,
        placeholder_name: impl Into<String>,
        events: broadcast::Sender<WidgetEvent>,
    ) -> Self {
        let (status, _) = watch::channel(ConversationStatus::Ai);
        Self {
            store,
            backend,
            realtime,
            identity,
            placeholder_name: placeholder_name.into(),
            machine: Mutex::new(StatusMachine::new()),
            status,
            events,
        }
    }

    pub fn current(&self) -> ConversationStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationStatus> {
        self.status.subscribe()
    }

    /// Feeds one status observation for `conversation_id` through the machine.
    ///
    /// Returns `None` when the conversation is not the active one.
    pub async fn handle(
        &self,
        conversation_id: &ConversationId,
        next: ConversationStatus,
    ) -> Option<Transition> {
        if *conversation_id != self.store.conversation_id() {
            debug!(conversation_id = %conversation_id, status = %next, "dropping status for inactive conversation");
            return None;
        }

        let notice_shown = self.identity.notice_shown(conversation_id);
        let transition = self
            .machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(next, notice_shown);
        self.status.send_if_modified(|current| {
            let changed = *current != transition.to;
            *current = transition.to;
            changed
        });
        if transition.from != transition.to {
            info!(
                conversation_id = %conversation_id,
                from = %transition.from,
                to = %transition.to,
                "conversation status changed"
            );
        }

        for effect in &transition.effects {
            match effect {
                StatusEffect::AnnounceAgent => self.announce_agent(conversation_id).await,
                StatusEffect::ClearNoticeFlag => {
                    self.identity.set_notice_shown(conversation_id, false);
                }
                StatusEffect::ConversationClosed => {
                    let _ = self.events.send(WidgetEvent::ConversationClosed {
                        conversation_id: conversation_id.clone(),
                    });
                }
                StatusEffect::Reopened => {
                    let _ = self.events.send(WidgetEvent::ConversationReopened {
                        conversation_id: conversation_id.clone(),
                    });
                }
            }
        }
        Some(transition)
    }

    async fn announce_agent(&self, conversation_id: &ConversationId) {
        let identity = match self.backend.fetch_agent_identity(conversation_id).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "agent identity lookup failed, using placeholder");
                None
            }
        };

        if *conversation_id != self.store.conversation_id() {
            debug!(conversation_id = %conversation_id, "conversation changed during identity lookup");
            return;
        }
        // A reload elsewhere may have shown it meanwhile.
        if self.identity.notice_shown(conversation_id) {
            return;
        }

        let (name, avatar) = match identity {
            Some(identity) if !identity.name.trim().is_empty() => (identity.name, identity.avatar),
            _ => (self.placeholder_name.clone(), None),
        };

        let mut notice = Message::system_notice(join_notice(&name));
        notice.sender_name = Some(name.clone());
        notice.sender_avatar = avatar;

        self.identity.set_notice_shown(conversation_id, true);
        self.store.inject_system_notice(notice);
        info!(conversation_id = %conversation_id, agent = %name, "human agent joined");
        let _ = self.events.send(WidgetEvent::AgentJoined {
            conversation_id: conversation_id.clone(),
            name,
        });
    }

    /// Follows the active conversation's status until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let scope = self.store.watch_conversation();
        run_scoped(scope, cancel, |conversation_id: ConversationId| {
            let monitor = self.clone();
            async move { monitor.follow(conversation_id).await }
        })
        .await;
    }

    async fn follow(&self, conversation_id: ConversationId) {
        self.machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        self.status.send_if_modified(|current| {
            let changed = *current != ConversationStatus::Ai;
            *current = ConversationStatus::Ai;
            changed
        });
        if conversation_id.is_new() {
            return;
        }

        // Subscribe before seeding so no change between the two is lost.
        let mut subscription = match self.realtime.subscribe_status(&conversation_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "status subscription failed");
                None
            }
        };

        match self.backend.fetch_conversation_status(&conversation_id).await {
            Ok(status) => {
                self.handle(&conversation_id, status).await;
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "initial status fetch failed");
            }
        }

        let Some(subscription) = subscription.as_mut() else {
            return;
        };
        while let Some(event) = subscription.recv().await {
            self.handle(&event.conversation_id, event.status).await;
        }
        debug!(conversation_id = %conversation_id, "status subscription closed");
    }
}
