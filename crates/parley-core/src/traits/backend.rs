// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend port: request/response calls to the hosted conversation service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ParleyError;
use crate::traits::adapter::PortAdapter;
use crate::types::{
    AgentId, AgentIdentity, ConversationId, ConversationStatus, MessageId, Reaction,
    RemoteMessage, SendRequest, SendResponse, WidgetConfig,
};

/// Adapter for the hosted conversation backend.
///
/// Every method is a suspension point; callers must not hold store state
/// across these calls.
#[async_trait]
pub trait BackendAdapter: PortAdapter {
    /// Sends the visitor's message with full history. May create a new
    /// conversation id.
    async fn send_message(&self, request: SendRequest) -> Result<SendResponse, ParleyError>;

    /// Fetches the full transcript of a conversation in chronological order.
    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<RemoteMessage>, ParleyError>;

    /// Fetches the current status of a conversation.
    async fn fetch_conversation_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationStatus, ParleyError>;

    /// Fetches the display identity of the human agent handling a conversation.
    async fn fetch_agent_identity(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<AgentIdentity>, ParleyError>;

    /// Fetches the widget configuration for an agent.
    async fn fetch_widget_config(&self, agent_id: &AgentId) -> Result<WidgetConfig, ParleyError>;

    /// Records (or clears) the visitor's reaction on a message.
    async fn set_reaction(
        &self,
        message_id: &MessageId,
        reaction: Option<Reaction>,
    ) -> Result<(), ParleyError>;

    /// Marks operator messages up to `through` as read by the visitor.
    async fn mark_read(
        &self,
        conversation_id: &ConversationId,
        through: DateTime<Utc>,
    ) -> Result<(), ParleyError>;
}
