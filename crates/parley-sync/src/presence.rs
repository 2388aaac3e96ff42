// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Visitor presence announcements for the operator dashboard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use tracing::{debug, warn};

use parley_config::model::PresenceConfig;
use parley_core::traits::RealtimeAdapter;
use parley_core::types::{AgentId, LeadHints, PageContext, PresenceRecord};

use crate::identity::PersistedIdentity;
use crate::store::ConversationStore;

pub struct PresenceBroadcaster {
    agent_id: AgentId,
    realtime: Arc<dyn RealtimeAdapter>,
    identity: Arc<PersistedIdentity>,
    store: Arc<ConversationStore>,
    config: PresenceConfig,
    open: AtomicBool,
    page: ArcSwapOption<PageContext>,
    lead: ArcSwap<LeadHints>,
}

impl PresenceBroadcaster {
    pub fn new(
        agent_id: AgentId,
        realtime: Arc<dyn RealtimeAdapter>,
        identity: Arc<PersistedIdentity>,
        store: Arc<ConversationStore>,
        config: PresenceConfig,
    ) -> Self {
        Self {
            agent_id,
            realtime,
            identity,
            store,
            config,
            open: AtomicBool::new(false),
            page: ArcSwapOption::empty(),
            lead: ArcSwap::from_pointee(LeadHints::default()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Widget opened. Always publishes.
    pub async fn announce_open(&self, page: Option<PageContext>) -> bool {
        if let Some(page) = page {
            self.page.store(Some(Arc::new(page)));
        }
        self.open.store(true, Ordering::SeqCst);
        self.publish(true).await
    }

    /// Visitor navigated. Publishes only when the page differs and the
    /// widget is open.
    pub async fn announce_page(&self, page: PageContext) -> bool {
        if self.page.load().as_deref() == Some(&page) {
            return false;
        }
        self.page.store(Some(Arc::new(page)));
        if !self.is_open() {
            return false;
        }
        self.publish(true).await
    }

    /// Widget closed: publishes the teardown record.
    pub async fn announce_close(&self) -> bool {
        if !self.open.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.publish(false).await
    }

    /// Updates the lead hints carried by the next record.
    pub fn set_lead(&self, lead: LeadHints) {
        self.lead.store(Arc::new(lead));
    }

    pub fn record(&self, widget_open: bool) -> PresenceRecord {
        let conversation_id = Some(self.store.conversation_id()).filter(|id| !id.is_new());
        let lead = if self.config.share_lead_hints {
            (**self.lead.load()).clone()
        } else {
            LeadHints::default()
        };
        PresenceRecord {
            visitor_id: self.identity.visitor_id(),
            agent_id: self.agent_id.clone(),
            conversation_id,
            page: self.page.load_full().map(|page| (*page).clone()),
            widget_open,
            lead,
            at: Utc::now(),
        }
    }

    async fn publish(&self, widget_open: bool) -> bool {
        if !self.config.enabled {
            return false;
        }
        let record = self.record(widget_open);
        debug!(
            visitor_id = %record.visitor_id,
            widget_open,
            page = ?record.page.as_ref().map(|p| p.url.as_str()),
            "publishing presence"
        );
        match self.realtime.publish_presence(record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "presence publish failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKeyValueStore;
    use parley_test_utils::InMemoryRealtime;

    fn broadcaster(config: PresenceConfig) -> (PresenceBroadcaster, Arc<InMemoryRealtime>) {
        let agent = AgentId("acme".into());
        let hub = Arc::new(InMemoryRealtime::new());
        let identity = Arc::new(PersistedIdentity::new(
            agent.clone(),
            Arc::new(MemoryKeyValueStore::new()),
        ));
        let presence = PresenceBroadcaster::new(
            agent,
            hub.clone(),
            identity,
            Arc::new(ConversationStore::new()),
            config,
        );
        (presence, hub)
    }

    fn page(url: &str) -> PageContext {
        PageContext {
            url: url.into(),
            title: None,
            referrer: None,
        }
    }

    #[tokio::test]
    async fn open_navigate_close_sequence() {
        let (presence, hub) = broadcaster(PresenceConfig::default());
        assert!(presence.announce_open(Some(page("/"))).await);
        assert!(!presence.announce_page(page("/")).await);
        assert!(presence.announce_page(page("/pricing")).await);
        assert!(presence.announce_close().await);
        assert!(!presence.announce_close().await);

        let records = hub.presence_records();
        assert_eq!(records.len(), 3);
        assert!(records[0].widget_open);
        assert_eq!(records[1].page.as_ref().unwrap().url, "/pricing");
        assert!(!records[2].widget_open);
        assert!(records[0].conversation_id.is_none());
    }

    #[tokio::test]
    async fn lead_hints_ride_on_next_record() {
        let (presence, hub) = broadcaster(PresenceConfig::default());
        presence.announce_open(None).await;
        presence.set_lead(LeadHints {
            name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            phone: None,
        });
        assert_eq!(hub.presence_records().len(), 1);

        presence.announce_page(page("/book")).await;
        let records = hub.presence_records();
        assert_eq!(records[1].lead.email.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn lead_hints_withheld_when_sharing_disabled() {
        let (presence, _) = broadcaster(PresenceConfig {
            enabled: true,
            share_lead_hints: false,
        });
        presence.set_lead(LeadHints {
            name: Some("Ada".into()),
            ..LeadHints::default()
        });
        assert_eq!(presence.record(true).lead, LeadHints::default());
    }

    #[tokio::test]
    async fn disabled_presence_publishes_nothing() {
        let (presence, hub) = broadcaster(PresenceConfig {
            enabled: false,
            share_lead_hints: true,
        });
        assert!(!presence.announce_open(Some(page("/"))).await);
        assert!(hub.presence_records().is_empty());
    }

    #[tokio::test]
    async fn navigation_while_closed_is_remembered() {
        let (presence, hub) = broadcaster(PresenceConfig::default());
        assert!(!presence.announce_page(page("/docs")).await);
        presence.announce_open(None).await;
        assert_eq!(
            hub.presence_records()[0].page.as_ref().unwrap().url,
            "/docs"
        );
    }
}
