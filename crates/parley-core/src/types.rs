// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the sync components and the adapter ports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Wire value of the conversation id before the first backend round trip.
pub const NEW_CONVERSATION: &str = "new";

/// Identifier of a conversation, or the `"new"` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// The sentinel used before the backend has assigned an id.
    pub fn sentinel() -> Self {
        ConversationId(NEW_CONVERSATION.to_string())
    }

    /// Returns `true` for the `"new"` sentinel (and for an empty id).
    pub fn is_new(&self) -> bool {
        self.0.is_empty() || self.0 == NEW_CONVERSATION
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::sentinel()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        ConversationId(value.to_string())
    }
}

/// Server-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId(value.to_string())
    }
}

/// Client-side correlation token for an optimistic message.
///
/// Monotonic within one store; never sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub u64);

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Stable identifier of the visitor using the widget.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisitorId(pub String);

impl std::fmt::Display for VisitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the agent (tenant) the widget is embedded for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Author of a message. `Assistant` covers both AI and human-agent replies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Visitor,
    Assistant,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Audio,
    File,
}

/// Where an attachment's bytes can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttachmentSource {
    /// Uploaded to object storage; the url is shareable.
    Remote { url: String },
    /// Upload failed; only the local client can render it.
    LocalPreview { name: String },
}

impl AttachmentSource {
    /// Only remote sources may be forwarded to the backend or other parties.
    pub fn is_shareable(&self) -> bool {
        matches!(self, AttachmentSource::Remote { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub source: AttachmentSource,
}

/// Visitor feedback on an assistant reply.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Reaction {
    ThumbsUp,
    ThumbsDown,
}

/// Delivery state shown next to a visitor message. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    Sent,
    Read,
    Failed,
}

/// A message as held in the local transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server id, present once the backend has acknowledged the message.
    pub id: Option<MessageId>,
    /// Correlation token for optimistic rows. Never serialized.
    #[serde(skip)]
    pub local_id: Option<LocalId>,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub is_system_notice: bool,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    #[serde(default)]
    pub reaction: Option<Reaction>,
    /// Set when `id` was attached by the content heuristic rather than by
    /// reconciling the send response.
    #[serde(skip)]
    pub provisional_id: bool,
}

impl Message {
    /// Build an outbound visitor row that has not been acknowledged yet.
    pub fn outbound(
        local_id: LocalId,
        content: impl Into<String>,
        kind: MessageKind,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            id: None,
            local_id: Some(local_id),
            role: Role::Visitor,
            content: content.into(),
            kind,
            attachments,
            created_at: Utc::now(),
            read_at: None,
            failed: false,
            is_system_notice: false,
            sender_name: None,
            sender_avatar: None,
            reaction: None,
            provisional_id: false,
        }
    }

    /// Build a synthetic, non-persisted notice row.
    pub fn system_notice(content: impl Into<String>) -> Self {
        Self {
            id: None,
            local_id: None,
            role: Role::Assistant,
            content: content.into(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
            created_at: Utc::now(),
            read_at: None,
            failed: false,
            is_system_notice: true,
            sender_name: None,
            sender_avatar: None,
            reaction: None,
            provisional_id: false,
        }
    }

    pub fn delivery_state(&self) -> DeliveryState {
        if self.failed {
            DeliveryState::Failed
        } else if self.id.is_none() {
            DeliveryState::Pending
        } else if self.read_at.is_some() {
            DeliveryState::Read
        } else {
            DeliveryState::Sent
        }
    }

    /// An outbound row still waiting for its server id.
    pub fn is_unresolved(&self) -> bool {
        self.id.is_none() && !self.failed && !self.is_system_notice
    }
}

impl From<RemoteMessage> for Message {
    fn from(remote: RemoteMessage) -> Self {
        Self {
            id: Some(remote.id),
            local_id: None,
            role: remote.role,
            content: remote.content,
            kind: remote.kind,
            attachments: remote.attachments,
            created_at: remote.created_at,
            read_at: remote.read_at,
            failed: false,
            is_system_notice: false,
            sender_name: remote.sender_name,
            sender_avatar: remote.sender_avatar,
            reaction: remote.reaction,
            provisional_id: false,
        }
    }
}

/// A message record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    #[serde(default)]
    pub reaction: Option<Reaction>,
}

impl RemoteMessage {
    /// Convenience constructor for a plain text record created now.
    pub fn text(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId(id.into()),
            role,
            content: content.into(),
            kind: MessageKind::Text,
            attachments: Vec::new(),
            created_at: Utc::now(),
            read_at: None,
            sender_name: None,
            sender_avatar: None,
            reaction: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageEventKind {
    Insert,
    Update,
}

/// A create/update push for a message row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub kind: MessageEventKind,
    pub conversation_id: ConversationId,
    pub message: RemoteMessage,
    /// Identifier of a streamed partial update, when the reply is streamed.
    #[serde(default)]
    pub chunk_id: Option<String>,
}

/// Conversation ownership state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Ai,
    HumanTakeover,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub conversation_id: ConversationId,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub conversation_id: ConversationId,
    pub is_typing: bool,
    #[serde(default)]
    pub agent_name: Option<String>,
}

/// The page the visitor is currently on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
}

/// Identity hints gathered from the visitor (booking form, contact capture).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LeadHints {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub visitor_id: VisitorId,
    pub agent_id: AgentId,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub page: Option<PageContext>,
    pub widget_open: bool,
    #[serde(default)]
    pub lead: LeadHints,
    pub at: DateTime<Utc>,
}

/// One prior turn sent to the backend as conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Who is expected to answer the visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReplyMode {
    Ai,
    Human,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub agent_id: AgentId,
    pub conversation_id: ConversationId,
    pub history: Vec<HistoryEntry>,
    pub visitor_id: VisitorId,
    /// Opaque analytics payload; passed through untouched.
    pub analytics: serde_json::Value,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub reply_mode: ReplyMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub assistant_reply: Option<String>,
    pub status: ConversationStatus,
    #[serde(default)]
    pub user_message_id: Option<MessageId>,
    #[serde(default)]
    pub assistant_message_id: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Remote widget configuration (branding, greeting, feature switches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub agent_id: AgentId,
    pub display_name: String,
    #[serde(default)]
    pub welcome_message: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Notification that the remote widget configuration changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChanged {
    pub agent_id: AgentId,
    pub at: DateTime<Utc>,
}

/// A file picked by the visitor, before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl OutgoingFile {
    pub fn kind(&self) -> MessageKind {
        if self.mime_type.starts_with("audio/") {
            MessageKind::Audio
        } else {
            MessageKind::File
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn sentinel_conversation_id() {
        assert!(ConversationId::sentinel().is_new());
        assert!(ConversationId::default().is_new());
        assert!(ConversationId(String::new()).is_new());
        assert!(!ConversationId::from("c1").is_new());
    }

    #[test]
    fn delivery_state_is_derived() {
        let mut msg = Message::outbound(LocalId(1), "Hi", MessageKind::Text, Vec::new());
        assert_eq!(msg.delivery_state(), DeliveryState::Pending);

        msg.id = Some(MessageId::from("m1"));
        assert_eq!(msg.delivery_state(), DeliveryState::Sent);

        msg.read_at = Some(Utc::now());
        assert_eq!(msg.delivery_state(), DeliveryState::Read);

        msg.failed = true;
        assert_eq!(msg.delivery_state(), DeliveryState::Failed);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(ConversationStatus::HumanTakeover.to_string(), "human_takeover");
        assert_eq!(
            ConversationStatus::from_str("closed").unwrap(),
            ConversationStatus::Closed
        );
        let json = serde_json::to_string(&ConversationStatus::HumanTakeover).unwrap();
        assert_eq!(json, "\"human_takeover\"");
    }

    #[test]
    fn local_id_is_not_serialized() {
        let msg = Message::outbound(LocalId(7), "Hi", MessageKind::Text, Vec::new());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("local_id").is_none());
        assert!(json.get("provisional_id").is_none());
    }

    #[test]
    fn attachment_shareability() {
        let remote = AttachmentSource::Remote {
            url: "https://cdn.example/a.png".into(),
        };
        let local = AttachmentSource::LocalPreview {
            name: "a.png".into(),
        };
        assert!(remote.is_shareable());
        assert!(!local.is_shareable());
    }

    #[test]
    fn outgoing_file_kind_from_mime() {
        let voice = OutgoingFile {
            name: "note.webm".into(),
            mime_type: "audio/webm".into(),
            bytes: vec![1, 2, 3],
        };
        let doc = OutgoingFile {
            name: "quote.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: vec![],
        };
        assert_eq!(voice.kind(), MessageKind::Audio);
        assert_eq!(doc.kind(), MessageKind::File);
    }

    #[test]
    fn system_notice_is_never_unresolved() {
        let notice = Message::system_notice("Dana has joined the conversation");
        assert!(!notice.is_unresolved());
        assert!(notice.is_system_notice);
    }
}
