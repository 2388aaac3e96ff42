// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock object-storage uploader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use parley_core::error::ParleyError;
use parley_core::traits::{PortAdapter, UploadAdapter};
use parley_core::types::{AgentId, ConversationId, OutgoingFile};

/// Returns `https://cdn.test/{agent}/{conversation}/{name}` for each upload,
/// or fails every upload while failing is set.
pub struct MockUploader {
    failing: AtomicBool,
    uploads: Mutex<Vec<String>>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// URLs of successful uploads.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortAdapter for MockUploader {
    fn name(&self) -> &str {
        "mock-uploader"
    }
}

#[async_trait]
impl UploadAdapter for MockUploader {
    async fn upload(
        &self,
        agent_id: &AgentId,
        conversation_id: &ConversationId,
        file: &OutgoingFile,
    ) -> Result<String, ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ParleyError::upload(format!("{} rejected", file.name)));
        }
        let url = format!("https://cdn.test/{agent_id}/{conversation_id}/{}", file.name);
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.clone());
        Ok(url)
    }
}
