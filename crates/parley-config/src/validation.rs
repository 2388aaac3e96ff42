// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation of configuration values.

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate semantic constraints, collecting every failure (no fail-fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let agent_id = config.widget.agent_id.trim();
    if agent_id.is_empty() {
        errors.push(ConfigError::Validation {
            message: "widget.agent_id must not be empty".to_string(),
        });
    } else if agent_id.contains(':') {
        // ':' separates namespace segments in rendered storage keys.
        errors.push(ConfigError::Validation {
            message: format!("widget.agent_id `{agent_id}` must not contain ':'"),
        });
    }

    if config.widget.placeholder_agent_name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "widget.placeholder_agent_name must not be empty".to_string(),
        });
    }

    if config.sync.config_debounce_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "sync.config_debounce_ms must be greater than 0".to_string(),
        });
    }

    if config.sync.typing_timeout_ms < 500 {
        errors.push(ConfigError::Validation {
            message: format!(
                "sync.typing_timeout_ms must be at least 500, got {}",
                config.sync.typing_timeout_ms
            ),
        });
    }

    if config.sync.recent_event_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "sync.recent_event_capacity must be greater than 0".to_string(),
        });
    }

    if config.sync.event_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "sync.event_buffer must be greater than 0".to_string(),
        });
    }

    if config.storage.state_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.state_path must not be empty".to_string(),
        });
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.level `{}` is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ParleyConfig::default();
        config.widget.agent_id = " ".into();
        config.sync.config_debounce_ms = 0;
        config.logging.level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn agent_id_with_separator_rejected() {
        let mut config = ParleyConfig::default();
        config.widget.agent_id = "acme:eu".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("must not contain ':'"));
    }
}
