// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley conversation sync core.

use thiserror::Error;

/// The primary error type used across all Parley ports and sync components.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend call failed (send, fetch, identity lookup).
    #[error("network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Attachment upload to object storage failed.
    #[error("upload error: {message}")]
    Upload {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A realtime subscription could not be established or was closed.
    #[error("subscription error: {message}")]
    Subscription {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Client-side key/value storage failed.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A transcript reset was attempted while a send is in flight.
    #[error("a send is in flight; transcript reset refused")]
    SendInFlight,

    /// The conversation is closed and no longer accepts messages.
    #[error("conversation is closed")]
    ConversationClosed,

    /// The outgoing message carried neither text nor attachments.
    #[error("message has no text and no attachments")]
    EmptyMessage,

    /// No message matched the given identifier.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Shorthand for a [`ParleyError::Network`] without an underlying source.
    pub fn network(message: impl Into<String>) -> Self {
        ParleyError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`ParleyError::Upload`] without an underlying source.
    pub fn upload(message: impl Into<String>) -> Self {
        ParleyError::Upload {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`ParleyError::Subscription`] without an underlying source.
    pub fn subscription(message: impl Into<String>) -> Self {
        ParleyError::Subscription {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the failure is a transient network condition.
    ///
    /// Transient failures mark the affected message as failed and leave the
    /// retry decision to the visitor.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ParleyError::Network { .. }
                | ParleyError::Upload { .. }
                | ParleyError::Subscription { .. }
                | ParleyError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ParleyError::network("offline").is_transient());
        assert!(ParleyError::upload("413").is_transient());
        assert!(
            ParleyError::Timeout {
                duration: std::time::Duration::from_secs(5)
            }
            .is_transient()
        );
        assert!(!ParleyError::SendInFlight.is_transient());
        assert!(!ParleyError::ConversationClosed.is_transient());
        assert!(!ParleyError::Config("bad".into()).is_transient());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            ParleyError::network("connection refused").to_string(),
            "network error: connection refused"
        );
        assert_eq!(
            ParleyError::MessageNotFound("m-1".into()).to_string(),
            "message not found: m-1"
        );
    }
}
