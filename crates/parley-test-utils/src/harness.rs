// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end widget tests.
//!
//! `TestHarness` assembles a [`ChatWidget`] against the mock backend, the
//! in-memory realtime hub, the mock uploader and an in-memory key/value
//! store, and keeps handles to each so tests can script and inspect them.

use std::sync::Arc;

use parley_config::model::ParleyConfig;
use parley_core::traits::KeyValueStore;
use parley_core::types::{ConversationId, MessageEvent, MessageEventKind, RemoteMessage, Role};
use parley_sync::{ChatWidget, MemoryKeyValueStore, Ports};

use crate::mock_backend::MockBackend;
use crate::mock_uploader::MockUploader;
use crate::realtime_hub::InMemoryRealtime;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: ParleyConfig,
    kv: Option<Arc<dyn KeyValueStore>>,
    backend: Option<Arc<MockBackend>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = ParleyConfig::default();
        config.widget.agent_id = "acme".to_string();
        Self {
            config,
            kv: None,
            backend: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ParleyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_placeholder_name(mut self, name: &str) -> Self {
        self.config.widget.placeholder_agent_name = name.to_string();
        self
    }

    /// Share a key/value store between harnesses to simulate a page reload.
    pub fn with_kv(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Share a backend between harnesses to simulate a page reload.
    pub fn with_backend(mut self, backend: Arc<MockBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> TestHarness {
        let backend = self.backend.unwrap_or_else(|| Arc::new(MockBackend::new()));
        let realtime = Arc::new(InMemoryRealtime::new());
        let uploader = Arc::new(MockUploader::new());
        let kv: Arc<dyn KeyValueStore> = match self.kv {
            Some(kv) => kv,
            None => Arc::new(MemoryKeyValueStore::new()),
        };

        let widget = ChatWidget::new(
            &self.config,
            Ports {
                backend: backend.clone(),
                realtime: realtime.clone(),
                uploader: uploader.clone(),
                kv: kv.clone(),
            },
        );

        TestHarness {
            widget,
            backend,
            realtime,
            uploader,
            kv,
            config: self.config,
        }
    }
}

/// A fully-assembled widget with handles to every mock port.
pub struct TestHarness {
    pub widget: ChatWidget,
    pub backend: Arc<MockBackend>,
    pub realtime: Arc<InMemoryRealtime>,
    pub uploader: Arc<MockUploader>,
    pub kv: Arc<dyn KeyValueStore>,
    pub config: ParleyConfig,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Lets spawned widget tasks run until they block.
    pub async fn settle(&self) {
        settle().await;
    }

    /// Waits until the widget's active conversation has live message, status
    /// and typing subscriptions.
    pub async fn wait_for_subscriptions(&self, conversation_id: &ConversationId) -> bool {
        eventually(|| {
            self.realtime.message_subscribers(conversation_id) == 1
                && self.realtime.status_subscribers(conversation_id) == 1
                && self.realtime.typing_subscribers(conversation_id) == 1
        })
        .await
    }

    /// Pushes an insert event for an assistant message to the active
    /// conversation.
    pub fn push_assistant(&self, id: &str, content: &str) -> usize {
        let conversation_id = self.widget.conversation_id();
        self.realtime.push_message(MessageEvent {
            kind: MessageEventKind::Insert,
            conversation_id,
            message: RemoteMessage::text(id, Role::Assistant, content),
            chunk_id: None,
        })
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Yields to the scheduler enough times for chained task wake-ups to run.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Polls `condition`, yielding between attempts. Returns its final value.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
