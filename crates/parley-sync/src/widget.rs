// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat widget orchestrator.
//!
//! [`ChatWidget`] wires every sync component to the adapter ports and owns
//! the lifecycle of the background tasks:
//! - realtime inbox, status monitor and typing signal, each scoped to the
//!   active conversation
//! - the debounced config watcher, scoped to the agent
//! - the deferred history loader, woken when sends drain
//!
//! Tasks start on [`ChatWidget::open`] under a child of the widget's root
//! cancellation token and are joined on [`ChatWidget::close`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_config::model::ParleyConfig;
use parley_core::error::ParleyError;
use parley_core::traits::{BackendAdapter, KeyValueStore, RealtimeAdapter, UploadAdapter};
use parley_core::types::{
    AgentId, ConversationId, ConversationStatus, HealthStatus, LeadHints, LocalId, MessageId,
    PageContext, Reaction, VisitorId, WidgetConfig,
};

use crate::analytics::AnalyticsTracker;
use crate::config_watcher::ConfigWatcher;
use crate::events::WidgetEvent;
use crate::history::{HistoryLoader, LoadOutcome};
use crate::identity::PersistedIdentity;
use crate::inbox::RealtimeInbox;
use crate::presence::PresenceBroadcaster;
use crate::sender::{MessageSender, OutgoingMessage, SendOutcome};
use crate::status::StatusMonitor;
use crate::store::{ConversationStore, Transcript};
use crate::typing::{TypingSignal, TypingState};

/// The adapters a widget runs against.
#[derive(Clone)]
pub struct Ports {
    pub backend: Arc<dyn BackendAdapter>,
    pub realtime: Arc<dyn RealtimeAdapter>,
    pub uploader: Arc<dyn UploadAdapter>,
    pub kv: Arc<dyn KeyValueStore>,
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct ChatWidget {
    resume_last_conversation: bool,
    ports: Ports,
    store: Arc<ConversationStore>,
    identity: Arc<PersistedIdentity>,
    analytics: Arc<AnalyticsTracker>,
    sender: MessageSender,
    inbox: Arc<RealtimeInbox>,
    status: Arc<StatusMonitor>,
    typing: Arc<TypingSignal>,
    presence: PresenceBroadcaster,
    config_watcher: Arc<ConfigWatcher>,
    history: Arc<HistoryLoader>,
    events: broadcast::Sender<WidgetEvent>,
    root: CancellationToken,
    running: Mutex<Option<Running>>,
}

impl ChatWidget {
    pub fn new(config: &ParleyConfig, ports: Ports) -> Self {
        let agent_id = AgentId(config.widget.agent_id.clone());
        let (events, _) = broadcast::channel(config.sync.event_buffer.max(1));

        let store = Arc::new(ConversationStore::new());
        let identity = Arc::new(PersistedIdentity::new(agent_id.clone(), ports.kv.clone()));
        let analytics = Arc::new(AnalyticsTracker::new());

        let status = Arc::new(StatusMonitor::new(
            store.clone(),
            ports.backend.clone(),
            ports.realtime.clone(),
            identity.clone(),
            config.widget.placeholder_agent_name.clone(),
            events.clone(),
        ));
        let sender = MessageSender::new(
            agent_id.clone(),
            store.clone(),
            ports.backend.clone(),
            ports.uploader.clone(),
            identity.clone(),
            analytics.clone(),
            status.subscribe(),
            events.clone(),
        );
        let inbox = Arc::new(RealtimeInbox::new(
            store.clone(),
            ports.realtime.clone(),
            config.sync.recent_event_capacity,
        ));
        let typing = Arc::new(TypingSignal::new(
            store.clone(),
            ports.realtime.clone(),
            Duration::from_millis(config.sync.typing_timeout_ms),
        ));
        let presence = PresenceBroadcaster::new(
            agent_id.clone(),
            ports.realtime.clone(),
            identity.clone(),
            store.clone(),
            config.presence.clone(),
        );
        let config_watcher = Arc::new(ConfigWatcher::new(
            agent_id.clone(),
            ports.backend.clone(),
            ports.realtime.clone(),
            Duration::from_millis(config.sync.config_debounce_ms),
            events.clone(),
        ));
        let history = Arc::new(HistoryLoader::new(store.clone(), ports.backend.clone()));

        info!(agent_id = %agent_id, "chat widget initialized");

        Self {
            resume_last_conversation: config.widget.resume_last_conversation,
            ports,
            store,
            identity,
            analytics,
            sender,
            inbox,
            status,
            typing,
            presence,
            config_watcher,
            history,
            events,
            root: CancellationToken::new(),
            running: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Opens the widget.
    ///
    /// Starts the background tasks, resumes the last conversation when
    /// configured, fetches the widget config and announces presence.
    /// Opening an open widget does nothing.
    pub async fn open(&self, page: Option<PageContext>) -> Result<(), ParleyError> {
        if self.root.is_cancelled() {
            return Err(ParleyError::Internal("widget has been shut down".into()));
        }
        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if running.is_some() {
                debug!("widget already open");
                return Ok(());
            }

            let cancel = self.root.child_token();
            let tasks = vec![
                tokio::spawn(self.inbox.clone().run(cancel.clone())),
                tokio::spawn(self.status.clone().run(cancel.clone())),
                tokio::spawn(self.typing.clone().run(cancel.clone())),
                tokio::spawn(self.config_watcher.clone().run(cancel.clone())),
                tokio::spawn(self.history.clone().run(cancel.clone())),
            ];
            *running = Some(Running { cancel, tasks });
        }

        if self.resume_last_conversation
            && self.store.conversation_id().is_new()
            && let Some(last) = self.identity.last_conversation()
        {
            match self.store.replace_all(last.clone(), Vec::new()) {
                Ok(()) => {
                    let outcome = self.history.load(&last).await;
                    debug!(conversation_id = %last, outcome = ?outcome, "resumed conversation");
                }
                Err(e) => warn!(error = %e, "could not resume last conversation"),
            }
        }

        if let Err(e) = self.config_watcher.refresh_now().await {
            warn!(error = %e, "initial widget config fetch failed");
        }

        if let Some(page) = &page {
            self.analytics.record_page(page);
        }
        self.presence.announce_open(page).await;

        info!(visitor_id = %self.identity.visitor_id(), "widget opened");
        let _ = self.events.send(WidgetEvent::Opened);
        Ok(())
    }

    /// Closes the widget: teardown presence, then stops and joins the tasks.
    pub async fn close(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        self.presence.announce_close().await;
        running.cancel.cancel();
        for result in futures::future::join_all(running.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "widget task ended abnormally");
            }
        }

        info!("widget closed");
        let _ = self.events.send(WidgetEvent::Closed);
    }

    /// Closes the widget and refuses any later `open`.
    pub async fn shutdown(&self) {
        self.close().await;
        self.root.cancel();
    }

    pub async fn send(&self, message: OutgoingMessage) -> Result<SendOutcome, ParleyError> {
        self.sender.send(message).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<SendOutcome, ParleyError> {
        self.sender.send(OutgoingMessage::text(text)).await
    }

    pub async fn retry(&self, local_id: LocalId) -> Result<SendOutcome, ParleyError> {
        self.sender.retry(local_id).await
    }

    /// Sets or clears the visitor's reaction on a message.
    ///
    /// Applied locally first and reverted if the backend rejects it.
    pub async fn react(
        &self,
        message_id: &MessageId,
        reaction: Option<Reaction>,
    ) -> Result<(), ParleyError> {
        let previous = self.store.set_reaction(message_id, reaction)?;
        if let Err(e) = self.ports.backend.set_reaction(message_id, reaction).await {
            warn!(message_id = %message_id, error = %e, "reaction rejected, reverting");
            let _ = self.store.set_reaction(message_id, previous);
            return Err(e);
        }
        Ok(())
    }

    /// Switches to another existing conversation and loads its transcript.
    ///
    /// A load rejected by a concurrent send is retried by the widget once
    /// sending goes idle.
    pub async fn switch_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<LoadOutcome, ParleyError> {
        self.store.replace_all(conversation_id.clone(), Vec::new())?;
        self.identity.remember_conversation(&conversation_id);
        Ok(self.history.load(&conversation_id).await)
    }

    /// Starts over on the `"new"` sentinel.
    pub fn start_new_conversation(&self) -> Result<(), ParleyError> {
        self.store
            .replace_all(ConversationId::sentinel(), Vec::new())?;
        self.identity.forget_conversation();
        Ok(())
    }

    /// Marks every assistant message shown so far as read.
    ///
    /// Returns the number of rows newly marked.
    pub async fn mark_read(&self) -> Result<usize, ParleyError> {
        let Some(through) = self.store.latest_assistant_at() else {
            return Ok(0);
        };
        self.identity.advance_last_read(through);
        let marked = self.store.mark_read_through(through);

        let conversation_id = self.store.conversation_id();
        if marked > 0 && !conversation_id.is_new() {
            self.ports.backend.mark_read(&conversation_id, through).await?;
        }
        Ok(marked)
    }

    /// Assistant messages newer than the persisted read watermark.
    pub fn unread_count(&self) -> usize {
        self.store.unread_count(self.identity.last_read_at())
    }

    /// Records a page change for analytics and presence.
    pub async fn navigate(&self, page: PageContext) {
        self.analytics.record_page(&page);
        self.presence.announce_page(page).await;
    }

    pub fn set_lead(&self, lead: LeadHints) {
        self.presence.set_lead(lead);
    }

    pub async fn visitor_typing(&self, is_typing: bool) {
        self.typing.publish_visitor_typing(is_typing).await;
    }

    /// Requests a debounced widget-config refetch.
    pub fn refresh_config(&self) {
        self.config_watcher.trigger();
    }

    pub fn transcript(&self) -> Transcript {
        self.store.snapshot()
    }

    pub fn subscribe_transcript(&self) -> watch::Receiver<Transcript> {
        self.store.subscribe()
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.store.conversation_id()
    }

    pub fn status(&self) -> ConversationStatus {
        self.status.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConversationStatus> {
        self.status.subscribe()
    }

    pub fn typing(&self) -> TypingState {
        self.typing.current()
    }

    pub fn subscribe_typing(&self) -> watch::Receiver<TypingState> {
        self.typing.subscribe()
    }

    pub fn widget_config(&self) -> Option<WidgetConfig> {
        self.config_watcher.current()
    }

    pub fn subscribe_config(&self) -> watch::Receiver<Option<WidgetConfig>> {
        self.config_watcher.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<WidgetEvent> {
        self.events.subscribe()
    }

    pub fn visitor_id(&self) -> VisitorId {
        self.identity.visitor_id()
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn config_watcher(&self) -> &Arc<ConfigWatcher> {
        &self.config_watcher
    }

    /// Health of every port, keyed by adapter name.
    pub async fn health_check(&self) -> Vec<(String, HealthStatus)> {
        let backend = &self.ports.backend;
        let realtime = &self.ports.realtime;
        let uploader = &self.ports.uploader;
        let kv = &self.ports.kv;
        vec![
            health_entry(backend.name(), backend.health_check().await),
            health_entry(realtime.name(), realtime.health_check().await),
            health_entry(uploader.name(), uploader.health_check().await),
            health_entry(kv.name(), kv.health_check().await),
        ]
    }
}

fn health_entry(name: &str, result: Result<HealthStatus, ParleyError>) -> (String, HealthStatus) {
    let status = result.unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
    (name.to_string(), status)
}

impl Drop for ChatWidget {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
