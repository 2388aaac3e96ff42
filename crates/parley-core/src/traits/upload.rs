// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Upload port for attachment bytes (object storage).

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PortAdapter;
use crate::types::{AgentId, ConversationId, OutgoingFile};

#[async_trait]
pub trait UploadAdapter: PortAdapter {
    /// Uploads a file and returns its public url.
    async fn upload(
        &self,
        agent_id: &AgentId,
        conversation_id: &ConversationId,
        file: &OutgoingFile,
    ) -> Result<String, ParleyError>;
}
