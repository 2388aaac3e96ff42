// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message flow: upload, optimistic insert, backend round trip,
//! reconciliation.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use parley_core::error::ParleyError;
use parley_core::traits::{BackendAdapter, UploadAdapter};
use parley_core::types::{
    AgentId, Attachment, AttachmentSource, ConversationId, ConversationStatus, HistoryEntry,
    LocalId, MessageId, MessageKind, OutgoingFile, RemoteMessage, ReplyMode, Role, SendRequest,
    SendResponse,
};

use crate::analytics::AnalyticsTracker;
use crate::events::WidgetEvent;
use crate::identity::PersistedIdentity;
use crate::store::{ConversationStore, OutboundDraft, ReconcilePatch, SendGuard};

/// What the visitor submitted.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub files: Vec<OutgoingFile>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: OutgoingFile) -> Self {
        self.files.push(file);
        self
    }
}

/// Result of one send. Transport failures are reported here, not as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Delivered {
        local_id: LocalId,
        message_id: Option<MessageId>,
        conversation_id: ConversationId,
    },
    Failed {
        local_id: LocalId,
        reason: String,
    },
}

impl SendOutcome {
    pub fn local_id(&self) -> LocalId {
        match self {
            SendOutcome::Delivered { local_id, .. } | SendOutcome::Failed { local_id, .. } => {
                *local_id
            }
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

pub struct MessageSender {
    agent_id: AgentId,
    store: Arc<ConversationStore>,
    backend: Arc<dyn BackendAdapter>,
    uploader: Arc<dyn UploadAdapter>,
    identity: Arc<PersistedIdentity>,
    analytics: Arc<AnalyticsTracker>,
    status: watch::Receiver<ConversationStatus>,
    events: broadcast::Sender<WidgetEvent>,
}

impl MessageSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: AgentId,
        store: Arc<ConversationStore>,
        backend: Arc<dyn BackendAdapter>,
        uploader: Arc<dyn UploadAdapter>,
        identity: Arc<PersistedIdentity>,
        analytics: Arc<AnalyticsTracker>,
        status: watch::Receiver<ConversationStatus>,
        events: broadcast::Sender<WidgetEvent>,
    ) -> Self {
        Self {
            agent_id,
            store,
            backend,
            uploader,
            identity,
            analytics,
            status,
            events,
        }
    }

    /// Sends a visitor message.
    ///
    /// Returns `Err` only when the message is refused up front (empty, or
    /// the conversation is closed); nothing is inserted in that case.
    pub async fn send(&self, message: OutgoingMessage) -> Result<SendOutcome, ParleyError> {
        if message.text.trim().is_empty() && message.files.is_empty() {
            return Err(ParleyError::EmptyMessage);
        }
        self.ensure_open()?;

        let guard = self.store.begin_send();
        let conversation_id = self.store.conversation_id();

        let kind = message
            .files
            .first()
            .map(OutgoingFile::kind)
            .unwrap_or(MessageKind::Text);
        let mut attachments = Vec::with_capacity(message.files.len());
        for file in &message.files {
            attachments.push(self.upload(&conversation_id, file).await);
        }

        let local_id = self.store.append_optimistic(OutboundDraft {
            content: message.text,
            kind,
            attachments,
        });
        debug!(local_id = %local_id, conversation_id = %conversation_id, "message queued");

        Ok(self.submit(local_id, guard).await)
    }

    /// Re-submits a failed message as a new send with a new local id.
    ///
    /// The failed row stays in the transcript.
    pub async fn retry(&self, local_id: LocalId) -> Result<SendOutcome, ParleyError> {
        let failed = self
            .store
            .snapshot()
            .find_by_local(local_id)
            .filter(|m| m.failed)
            .cloned()
            .ok_or_else(|| ParleyError::MessageNotFound(local_id.to_string()))?;
        self.ensure_open()?;

        let guard = self.store.begin_send();
        let retry_id = self.store.append_optimistic(OutboundDraft {
            content: failed.content,
            kind: failed.kind,
            attachments: failed.attachments,
        });
        info!(failed = %local_id, retry = %retry_id, "retrying failed message");

        Ok(self.submit(retry_id, guard).await)
    }

    fn ensure_open(&self) -> Result<(), ParleyError> {
        if *self.status.borrow() == ConversationStatus::Closed {
            return Err(ParleyError::ConversationClosed);
        }
        Ok(())
    }

    async fn upload(&self, conversation_id: &ConversationId, file: &OutgoingFile) -> Attachment {
        let source = match self
            .uploader
            .upload(&self.agent_id, conversation_id, file)
            .await
        {
            Ok(url) => AttachmentSource::Remote { url },
            Err(e) => {
                warn!(file = %file.name, error = %e, "upload failed, keeping local preview");
                AttachmentSource::LocalPreview {
                    name: file.name.clone(),
                }
            }
        };
        Attachment {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.bytes.len() as u64,
            source,
        }
    }

    /// Performs the backend round trip for an already-inserted row.
    ///
    /// The guard is held until reconciliation is complete.
    async fn submit(&self, local_id: LocalId, _guard: SendGuard) -> SendOutcome {
        let conversation_id = self.store.conversation_id();
        let transcript = self.store.snapshot();

        let history = transcript
            .messages
            .iter()
            .filter(|m| !m.is_system_notice && !m.failed)
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        let attachments = transcript
            .find_by_local(local_id)
            .map(|m| {
                m.attachments
                    .iter()
                    .filter(|a| a.source.is_shareable())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let reply_mode = match *self.status.borrow() {
            ConversationStatus::HumanTakeover => ReplyMode::Human,
            _ => ReplyMode::Ai,
        };

        let request = SendRequest {
            agent_id: self.agent_id.clone(),
            conversation_id: conversation_id.clone(),
            history,
            visitor_id: self.identity.visitor_id(),
            analytics: self.analytics.payload(),
            attachments,
            reply_mode,
        };

        match self.backend.send_message(request).await {
            Ok(response) => self.apply_response(local_id, response),
            Err(e) => {
                warn!(local_id = %local_id, error = %e, "send failed");
                self.store.mark_failed(local_id);
                SendOutcome::Failed {
                    local_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    fn apply_response(&self, local_id: LocalId, response: SendResponse) -> SendOutcome {
        let conversation_id = response.conversation_id;
        if !conversation_id.is_new() && self.store.promote_conversation(&conversation_id) {
            self.identity.remember_conversation(&conversation_id);
            let _ = self.events.send(WidgetEvent::ConversationStarted {
                conversation_id: conversation_id.clone(),
            });
        }

        if let Some(server_id) = &response.user_message_id {
            self.store
                .reconcile(local_id, server_id, ReconcilePatch::default());
        }

        if let Some(reply) = response.assistant_reply.filter(|r| !r.is_empty()) {
            match response.assistant_message_id {
                Some(id) => {
                    self.store.merge_remote(RemoteMessage {
                        id,
                        role: Role::Assistant,
                        content: reply,
                        kind: MessageKind::Text,
                        attachments: Vec::new(),
                        created_at: Utc::now(),
                        read_at: None,
                        sender_name: None,
                        sender_avatar: None,
                        reaction: None,
                    });
                }
                None => self.store.append_unacknowledged_reply(reply),
            }
        }

        debug!(
            local_id = %local_id,
            conversation_id = %conversation_id,
            status = %response.status,
            "send acknowledged"
        );
        SendOutcome::Delivered {
            local_id,
            message_id: response.user_message_id,
            conversation_id,
        }
    }
}
