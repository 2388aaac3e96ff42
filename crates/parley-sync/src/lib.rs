// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation synchronization core for the Parley chat widget.
//!
//! Keeps the visitor's optimistically-updated transcript consistent with the
//! server while send responses, realtime pushes, history fetches, status
//! changes and typing signals arrive out of order:
//! - [`ConversationStore`] is the only writer of the transcript and the
//!   single dedup boundary
//! - [`MessageSender`] runs the optimistic send flow
//! - [`RealtimeInbox`], [`StatusMonitor`] and [`TypingSignal`] follow the
//!   active conversation
//! - [`ChatWidget`] wires everything to the adapter ports

pub mod analytics;
pub mod config_watcher;
pub mod events;
pub mod history;
pub mod identity;
pub mod inbox;
pub mod kv;
pub mod presence;
pub mod scope;
pub mod sender;
pub mod status;
pub mod store;
pub mod typing;
pub mod widget;

pub use analytics::AnalyticsTracker;
pub use config_watcher::ConfigWatcher;
pub use events::WidgetEvent;
pub use history::{HistoryLoader, LoadOutcome, SkipReason};
pub use identity::PersistedIdentity;
pub use inbox::{InboxOutcome, RealtimeInbox};
pub use kv::{FileKeyValueStore, MemoryKeyValueStore};
pub use presence::PresenceBroadcaster;
pub use sender::{MessageSender, OutgoingMessage, SendOutcome};
pub use status::{StatusEffect, StatusMachine, StatusMonitor, Transition};
pub use store::{
    ConversationStore, FetchRejection, MergeOutcome, OutboundDraft, ReconcilePatch, SendGuard,
    Transcript,
};
pub use typing::{TypingSignal, TypingState};
pub use widget::{ChatWidget, Ports};
