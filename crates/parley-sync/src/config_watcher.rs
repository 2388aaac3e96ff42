// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounced refetching of the remote widget configuration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, broadcast, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use parley_core::error::ParleyError;
use parley_core::traits::{BackendAdapter, RealtimeAdapter, Subscription};
use parley_core::types::{AgentId, ConfigChanged, WidgetConfig};

use crate::events::WidgetEvent;

pub struct ConfigWatcher {
    agent_id: AgentId,
    backend: Arc<dyn BackendAdapter>,
    realtime: Arc<dyn RealtimeAdapter>,
    debounce: Duration,
    trigger: Notify,
    config: watch::Sender<Option<WidgetConfig>>,
    events: broadcast::Sender<WidgetEvent>,
    fetches: AtomicUsize,
    running: AtomicBool,
}

impl ConfigWatcher {
    pub fn new(
        agent_id: AgentId,
        backend: Arc<dyn BackendAdapter>,
        realtime: Arc<dyn RealtimeAdapter>,
        debounce: Duration,
        events: broadcast::Sender<WidgetEvent>,
    ) -> Self {
        let (config, _) = watch::channel(None);
        Self {
            agent_id,
            backend,
            realtime,
            debounce,
            trigger: Notify::new(),
            config,
            events,
            fetches: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Latest fetched configuration, if any fetch has succeeded.
    pub fn current(&self) -> Option<WidgetConfig> {
        self.config.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<WidgetConfig>> {
        self.config.subscribe()
    }

    /// Number of fetches issued so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Requests a refetch. Calls within the debounce window coalesce.
    ///
    /// Ignored while the debounce loop is not running.
    pub fn trigger(&self) {
        if !self.running.load(Ordering::SeqCst) {
            trace!("config watcher idle, trigger dropped");
            return;
        }
        self.trigger.notify_one();
    }

    /// Fetches immediately, bypassing the debounce window.
    pub async fn refresh_now(&self) -> Result<WidgetConfig, ParleyError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let config = self.backend.fetch_widget_config(&self.agent_id).await?;
        self.config.send_replace(Some(config.clone()));
        let _ = self
            .events
            .send(WidgetEvent::ConfigUpdated(Box::new(config.clone())));
        Ok(config)
    }

    async fn refetch(&self) {
        match self.refresh_now().await {
            Ok(config) => {
                info!(agent_id = %self.agent_id, updated_at = ?config.updated_at, "widget config refreshed");
            }
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "widget config refetch failed, keeping previous");
            }
        }
    }

    /// Runs the debounce loop until cancelled.
    ///
    /// Each change notification or local trigger resets the window; one
    /// fetch runs when the window elapses quietly. Cancellation also
    /// abandons a fetch in progress.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        self.debounce_loop(&cancel).await;
        self.running.store(false, Ordering::SeqCst);
    }

    async fn debounce_loop(&self, cancel: &CancellationToken) {
        let mut subscription = match self.realtime.subscribe_config(&self.agent_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "config subscription failed");
                None
            }
        };

        let mut deadline: Option<Instant> = None;
        loop {
            let expiry = deadline.unwrap_or_else(Instant::now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.trigger.notified() => {
                    trace!("config refetch triggered locally");
                    deadline = Some(Instant::now() + self.debounce);
                }
                change = next_change(&mut subscription) => match change {
                    Some(change) => {
                        trace!(at = %change.at, "config change notified");
                        deadline = Some(Instant::now() + self.debounce);
                    }
                    None => {
                        debug!(agent_id = %self.agent_id, "config subscription closed");
                        subscription = None;
                    }
                },
                _ = sleep_until(expiry), if deadline.is_some() => {
                    deadline = None;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!(agent_id = %self.agent_id, "config refetch abandoned");
                            break;
                        }
                        () = self.refetch() => {}
                    }
                }
            }
        }
    }
}

async fn next_change(subscription: &mut Option<Subscription<ConfigChanged>>) -> Option<ConfigChanged> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
