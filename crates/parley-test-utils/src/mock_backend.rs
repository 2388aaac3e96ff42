// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted backend adapter for deterministic testing.
//!
//! `MockBackend` answers sends like a real conversation service (assigns a
//! conversation id on the first send, persists the exchange for later
//! fetches) and lets tests hold individual calls to force interleavings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use parley_core::error::ParleyError;
use parley_core::traits::{BackendAdapter, PortAdapter};
use parley_core::types::{
    AgentId, AgentIdentity, ConversationId, ConversationStatus, HealthStatus, MessageId,
    Reaction, RemoteMessage, Role, SendRequest, SendResponse, WidgetConfig,
};

/// Runs after a send response is computed and before it is returned.
pub type SendHook = dyn Fn(&SendRequest, &SendResponse) + Send + Sync;

struct State {
    offline: bool,
    reply: Option<String>,
    user_ids: bool,
    assistant_ids: bool,
    next_conversation: ConversationId,
    requests: Vec<SendRequest>,
    messages: HashMap<ConversationId, Vec<RemoteMessage>>,
    statuses: HashMap<ConversationId, ConversationStatus>,
    identity: Option<AgentIdentity>,
    identity_failing: bool,
    config_failing: bool,
    config_name: String,
    reaction_failing: bool,
    reactions: Vec<(MessageId, Option<Reaction>)>,
    read_marks: Vec<(ConversationId, DateTime<Utc>)>,
}

pub struct MockBackend {
    state: Mutex<State>,
    sends: AtomicUsize,
    fetches: AtomicUsize,
    identity_fetches: AtomicUsize,
    config_fetches: AtomicUsize,
    send_gate: Mutex<Option<Arc<Semaphore>>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    config_gate: Mutex<Option<Arc<Semaphore>>>,
    on_send: Mutex<Option<Arc<SendHook>>>,
}

impl MockBackend {
    /// A healthy backend that assigns `conv-1` and acknowledges every send.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                offline: false,
                reply: None,
                user_ids: true,
                assistant_ids: true,
                next_conversation: ConversationId::from("conv-1"),
                requests: Vec::new(),
                messages: HashMap::new(),
                statuses: HashMap::new(),
                identity: None,
                identity_failing: false,
                config_failing: false,
                config_name: "Test Agent".to_string(),
                reaction_failing: false,
                reactions: Vec::new(),
                read_marks: Vec::new(),
            }),
            sends: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            identity_fetches: AtomicUsize::new(0),
            config_fetches: AtomicUsize::new(0),
            send_gate: Mutex::new(None),
            fetch_gate: Mutex::new(None),
            config_gate: Mutex::new(None),
            on_send: Mutex::new(None),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call fails with a network error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Assistant reply returned with each send.
    pub fn set_reply(&self, reply: Option<&str>) {
        self.state().reply = reply.map(str::to_string);
    }

    /// Whether responses carry the visitor message id.
    pub fn set_user_ids(&self, enabled: bool) {
        self.state().user_ids = enabled;
    }

    /// Whether responses carry the assistant message id.
    pub fn set_assistant_ids(&self, enabled: bool) {
        self.state().assistant_ids = enabled;
    }

    /// Conversation id handed out to the next send on the sentinel.
    pub fn set_next_conversation(&self, id: &str) {
        self.state().next_conversation = ConversationId::from(id);
    }

    /// All send requests received, including failed ones.
    pub fn sent_requests(&self) -> Vec<SendRequest> {
        self.state().requests.clone()
    }

    pub fn send_count(&self) -> usize {
        self.state().requests.len()
    }

    /// Replaces the stored transcript of a conversation.
    pub fn set_messages(&self, conversation_id: &ConversationId, messages: Vec<RemoteMessage>) {
        self.state()
            .messages
            .insert(conversation_id.clone(), messages);
    }

    /// Stored transcript of a conversation.
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<RemoteMessage> {
        self.state()
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `fetch_messages` calls.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, conversation_id: &ConversationId, status: ConversationStatus) {
        self.state()
            .statuses
            .insert(conversation_id.clone(), status);
    }

    pub fn set_identity(&self, identity: Option<AgentIdentity>) {
        self.state().identity = identity;
    }

    pub fn set_identity_failing(&self, failing: bool) {
        self.state().identity_failing = failing;
    }

    pub fn identity_fetch_count(&self) -> usize {
        self.identity_fetches.load(Ordering::SeqCst)
    }

    pub fn set_config_failing(&self, failing: bool) {
        self.state().config_failing = failing;
    }

    /// Display name served in the widget config.
    pub fn set_config_name(&self, name: &str) {
        self.state().config_name = name.to_string();
    }

    pub fn config_fetch_count(&self) -> usize {
        self.config_fetches.load(Ordering::SeqCst)
    }

    pub fn set_reaction_failing(&self, failing: bool) {
        self.state().reaction_failing = failing;
    }

    pub fn reactions(&self) -> Vec<(MessageId, Option<Reaction>)> {
        self.state().reactions.clone()
    }

    pub fn read_marks(&self) -> Vec<(ConversationId, DateTime<Utc>)> {
        self.state().read_marks.clone()
    }

    /// Installs a hook run for each successful send before it returns.
    ///
    /// Use it to push a realtime echo that beats the response.
    pub fn on_send(&self, hook: impl Fn(&SendRequest, &SendResponse) + Send + Sync + 'static) {
        *self.on_send.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Holds every send until [`release_sends`](Self::release_sends).
    pub fn hold_sends(&self) {
        *self.send_gate.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `n` held sends complete.
    pub fn release_sends(&self, n: usize) {
        if let Some(gate) = self.send_gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            gate.add_permits(n);
        }
    }

    /// Removes the send gate and lets every held send complete.
    pub fn resume_sends(&self) {
        if let Some(gate) = self.send_gate.lock().unwrap_or_else(PoisonError::into_inner).take() {
            gate.close();
        }
    }

    /// Holds every history fetch until released.
    pub fn hold_fetches(&self) {
        *self.fetch_gate.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_fetches(&self, n: usize) {
        if let Some(gate) = self.fetch_gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            gate.add_permits(n);
        }
    }

    /// Holds every widget-config fetch until released.
    pub fn hold_config_fetches(&self) {
        *self.config_gate.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_config_fetches(&self, n: usize) {
        if let Some(gate) = self.config_gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            gate.add_permits(n);
        }
    }

    fn check_online(&self) -> Result<(), ParleyError> {
        if self.state().offline {
            return Err(ParleyError::network("backend offline"));
        }
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn pass(gate: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
    if let Some(gate) = gate
        && let Ok(permit) = gate.acquire().await
    {
        permit.forget();
    }
}

#[async_trait]
impl PortAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.state().offline {
            return Ok(HealthStatus::Unhealthy("offline".into()));
        }
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl BackendAdapter for MockBackend {
    async fn send_message(&self, request: SendRequest) -> Result<SendResponse, ParleyError> {
        self.state().requests.push(request.clone());
        self.check_online()?;

        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        let response = {
            let mut state = self.state();
            let conversation_id = if request.conversation_id.is_new() {
                state.next_conversation.clone()
            } else {
                request.conversation_id.clone()
            };
            let user_message_id = MessageId(format!("msg-{n}"));
            let reply = state.reply.clone();
            let assistant_message_id = MessageId(format!("reply-{n}"));

            let content = request
                .history
                .last()
                .filter(|h| h.role == Role::Visitor)
                .map(|h| h.content.clone())
                .unwrap_or_default();
            let stored = state.messages.entry(conversation_id.clone()).or_default();
            stored.push(RemoteMessage::text(
                user_message_id.0.clone(),
                Role::Visitor,
                content,
            ));
            if let Some(reply) = &reply {
                stored.push(RemoteMessage::text(
                    assistant_message_id.0.clone(),
                    Role::Assistant,
                    reply.clone(),
                ));
            }

            SendResponse {
                status: state
                    .statuses
                    .get(&conversation_id)
                    .copied()
                    .unwrap_or_default(),
                conversation_id,
                assistant_reply: reply,
                user_message_id: state.user_ids.then_some(user_message_id),
                assistant_message_id: state.assistant_ids.then_some(assistant_message_id),
            }
        };

        let hook = self
            .on_send
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook(&request, &response);
        }

        pass(&self.send_gate).await;
        Ok(response)
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<RemoteMessage>, ParleyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let messages = self.messages(conversation_id);
        pass(&self.fetch_gate).await;
        Ok(messages)
    }

    async fn fetch_conversation_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationStatus, ParleyError> {
        self.check_online()?;
        Ok(self
            .state()
            .statuses
            .get(conversation_id)
            .copied()
            .unwrap_or_default())
    }

    async fn fetch_agent_identity(
        &self,
        _conversation_id: &ConversationId,
    ) -> Result<Option<AgentIdentity>, ParleyError> {
        self.identity_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        let state = self.state();
        if state.identity_failing {
            return Err(ParleyError::network("identity lookup failed"));
        }
        Ok(state.identity.clone())
    }

    async fn fetch_widget_config(&self, agent_id: &AgentId) -> Result<WidgetConfig, ParleyError> {
        self.config_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        pass(&self.config_gate).await;
        let state = self.state();
        if state.config_failing {
            return Err(ParleyError::network("config fetch failed"));
        }
        Ok(WidgetConfig {
            agent_id: agent_id.clone(),
            display_name: state.config_name.clone(),
            welcome_message: Some("Hi there! How can we help?".into()),
            accent_color: Some("#3b82f6".into()),
            settings: serde_json::json!({ "voice_notes": true }),
            updated_at: Some(Utc::now()),
        })
    }

    async fn set_reaction(
        &self,
        message_id: &MessageId,
        reaction: Option<Reaction>,
    ) -> Result<(), ParleyError> {
        self.check_online()?;
        let mut state = self.state();
        if state.reaction_failing {
            return Err(ParleyError::network("reaction rejected"));
        }
        state.reactions.push((message_id.clone(), reaction));
        Ok(())
    }

    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        through: DateTime<Utc>,
    ) -> Result<(), ParleyError> {
        self.check_online()?;
        self.state()
            .read_marks
            .push((conversation_id.clone(), through));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::{ReplyMode, VisitorId};

    fn request(conversation: &str, text: &str) -> SendRequest {
        SendRequest {
            agent_id: AgentId("acme".into()),
            conversation_id: ConversationId::from(conversation),
            history: vec![parley_core::types::HistoryEntry {
                role: Role::Visitor,
                content: text.into(),
            }],
            visitor_id: VisitorId("visitor_1".into()),
            analytics: serde_json::Value::Null,
            attachments: Vec::new(),
            reply_mode: ReplyMode::Ai,
        }
    }

    #[tokio::test]
    async fn first_send_assigns_conversation_and_persists() {
        let backend = MockBackend::new();
        backend.set_reply(Some("Hello"));
        let response = backend.send_message(request("new", "Hi")).await.unwrap();

        assert_eq!(response.conversation_id, ConversationId::from("conv-1"));
        assert_eq!(response.user_message_id, Some(MessageId::from("msg-1")));
        assert_eq!(backend.messages(&response.conversation_id).len(), 2);
    }

    #[tokio::test]
    async fn held_send_waits_for_release() {
        let backend = Arc::new(MockBackend::new());
        backend.hold_sends();

        let task = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.send_message(request("c1", "Hi")).await })
        };
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        backend.release_sends(1);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn offline_send_is_recorded_and_fails() {
        let backend = MockBackend::new();
        backend.set_offline(true);
        let err = backend.send_message(request("c1", "Hi")).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(backend.send_count(), 1);
    }
}
