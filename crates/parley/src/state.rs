// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley state` command implementation.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use parley_config::ParleyConfig;
use parley_core::types::AgentId;
use parley_core::{HealthStatus, ParleyError, PortAdapter};
use parley_sync::{FileKeyValueStore, PersistedIdentity};

/// What a widget for the configured agent would see on its next open.
#[derive(Debug, Serialize)]
pub struct StateReport {
    pub path: String,
    pub agent_id: String,
    pub health: String,
    pub visitor_id: String,
    pub last_conversation: Option<String>,
    pub last_read_at: Option<String>,
    pub entries: usize,
}

impl fmt::Display for StateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  state file         {}", self.path)?;
        writeln!(f, "  health             {}", self.health)?;
        writeln!(f, "  agent              {}", self.agent_id)?;
        writeln!(f, "  visitor            {}", self.visitor_id)?;
        writeln!(
            f,
            "  last conversation  {}",
            self.last_conversation.as_deref().unwrap_or("-")
        )?;
        writeln!(
            f,
            "  last read          {}",
            self.last_read_at.as_deref().unwrap_or("-")
        )?;
        writeln!(f, "  entries            {}", self.entries)
    }
}

/// Opens the configured state file and reports the agent's persisted state.
///
/// Reading the visitor id creates and persists one if none exists yet.
pub async fn inspect(
    config: &ParleyConfig,
    forget_conversation: bool,
) -> Result<StateReport, ParleyError> {
    let kv = Arc::new(FileKeyValueStore::open(&config.storage.state_path)?);
    let health = match kv.health_check().await? {
        HealthStatus::Healthy => "healthy".to_string(),
        HealthStatus::Degraded(reason) => format!("degraded ({reason})"),
        HealthStatus::Unhealthy(reason) => format!("unhealthy ({reason})"),
    };

    let agent_id = AgentId(config.widget.agent_id.clone());
    let identity = PersistedIdentity::new(agent_id.clone(), kv.clone());
    if forget_conversation {
        identity.forget_conversation();
    }

    Ok(StateReport {
        path: kv.path().display().to_string(),
        agent_id: agent_id.0,
        health,
        visitor_id: identity.visitor_id().0,
        last_conversation: identity.last_conversation().map(|c| c.to_string()),
        last_read_at: identity.last_read_at().map(|t| t.to_rfc3339()),
        entries: kv.entries().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::ConversationId;

    fn config_at(dir: &tempfile::TempDir) -> ParleyConfig {
        let mut config = ParleyConfig::default();
        config.widget.agent_id = "acme".to_string();
        config.storage.state_path = dir.path().join("state.json").display().to_string();
        config
    }

    #[tokio::test]
    async fn fresh_state_gets_visitor_id() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(&dir);

        let first = inspect(&config, false).await.unwrap();
        assert!(first.visitor_id.starts_with("visitor_"));
        assert_eq!(first.health, "healthy");
        assert_eq!(first.last_conversation, None);

        let second = inspect(&config, false).await.unwrap();
        assert_eq!(second.visitor_id, first.visitor_id);
    }

    #[tokio::test]
    async fn forget_clears_resume_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_at(&dir);
        {
            let kv = Arc::new(FileKeyValueStore::open(&config.storage.state_path).unwrap());
            PersistedIdentity::new(AgentId("acme".into()), kv)
                .remember_conversation(&ConversationId::from("conv-7"));
        }

        let report = inspect(&config, false).await.unwrap();
        assert_eq!(report.last_conversation.as_deref(), Some("conv-7"));

        let report = inspect(&config, true).await.unwrap();
        assert_eq!(report.last_conversation, None);
        assert!(report.to_string().contains("last conversation  -"));
    }
}
