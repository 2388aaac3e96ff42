// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley sync core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key fails
//! at startup instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Every section is optional and defaults to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Widget identity settings.
    #[serde(default)]
    pub widget: WidgetSection,

    /// Timing and buffer settings for the sync components.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Presence broadcasting settings.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Client-side state storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Widget identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WidgetSection {
    /// Agent (tenant) the widget belongs to. Namespaces all persisted state.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// Label used in the join notice when the agent's identity cannot be fetched.
    #[serde(default = "default_placeholder_agent_name")]
    pub placeholder_agent_name: String,

    /// Resume the last conversation on open.
    #[serde(default = "default_resume_last_conversation")]
    pub resume_last_conversation: bool,
}

impl Default for WidgetSection {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            placeholder_agent_name: default_placeholder_agent_name(),
            resume_last_conversation: default_resume_last_conversation(),
        }
    }
}

fn default_agent_id() -> String {
    "default".to_string()
}

fn default_placeholder_agent_name() -> String {
    "An agent".to_string()
}

fn default_resume_last_conversation() -> bool {
    true
}

/// Sync component tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Debounce window for widget-config refetches, in milliseconds.
    #[serde(default = "default_config_debounce_ms")]
    pub config_debounce_ms: u64,

    /// How long an operator typing indicator stays visible without a refresh.
    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,

    /// Number of recent realtime event keys remembered for dedup.
    #[serde(default = "default_recent_event_capacity")]
    pub recent_event_capacity: usize,

    /// Buffered events per widget event broadcast receiver.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            config_debounce_ms: default_config_debounce_ms(),
            typing_timeout_ms: default_typing_timeout_ms(),
            recent_event_capacity: default_recent_event_capacity(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_config_debounce_ms() -> u64 {
    300
}

fn default_typing_timeout_ms() -> u64 {
    6_000
}

fn default_recent_event_capacity() -> usize {
    256
}

fn default_event_buffer() -> usize {
    64
}

/// Presence broadcast configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// Publish presence records at all.
    #[serde(default = "default_presence_enabled")]
    pub enabled: bool,

    /// Include lead identity hints (name, email, phone) in presence records.
    #[serde(default = "default_share_lead_hints")]
    pub share_lead_hints: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_presence_enabled(),
            share_lead_hints: default_share_lead_hints(),
        }
    }
}

fn default_presence_enabled() -> bool {
    true
}

fn default_share_lead_hints() -> bool {
    true
}

/// Client-side state storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path of the JSON file holding visitor id, watermarks and notice flags.
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

fn default_state_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("state.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley-state.json"))
        .to_string_lossy()
        .into_owned()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ParleyConfig::default();
        assert_eq!(config.widget.agent_id, "default");
        assert_eq!(config.widget.placeholder_agent_name, "An agent");
        assert_eq!(config.sync.config_debounce_ms, 300);
        assert_eq!(config.sync.typing_timeout_ms, 6_000);
        assert_eq!(config.sync.recent_event_capacity, 256);
        assert!(config.presence.enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.storage.state_path.ends_with("state.json"));
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: ParleyConfig = toml::from_str("").unwrap();
        assert_eq!(config.sync.config_debounce_ms, 300);
        assert!(config.widget.resume_last_conversation);
    }
}
