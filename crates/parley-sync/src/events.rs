// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle notifications broadcast to the embedding application.

use parley_core::types::{ConversationId, WidgetConfig};
use strum::Display;

#[derive(Debug, Clone, PartialEq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum WidgetEvent {
    Opened,
    Closed,
    /// The backend assigned an id to a new conversation.
    ConversationStarted { conversation_id: ConversationId },
    /// A human agent took over and the join notice was shown.
    AgentJoined {
        conversation_id: ConversationId,
        name: String,
    },
    ConversationClosed { conversation_id: ConversationId },
    ConversationReopened { conversation_id: ConversationId },
    ConfigUpdated(Box<WidgetConfig>),
}
