// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley conversation sync core.
//!
//! This crate provides the shared types, the error type, and the port traits
//! (backend, realtime, upload, client storage) that the sync components are
//! written against. Concrete adapters live outside the core.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use types::{
    AgentId, ConversationId, ConversationStatus, HealthStatus, LocalId, Message, MessageId,
    VisitorId,
};

// Re-export all port traits at crate root.
pub use traits::{
    BackendAdapter, KeyValueStore, PortAdapter, RealtimeAdapter, StorageField, StorageKey,
    Subscription, UploadAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ports_are_exported() {
        fn _assert_backend<T: BackendAdapter>() {}
        fn _assert_realtime<T: RealtimeAdapter>() {}
        fn _assert_upload<T: UploadAdapter>() {}
        fn _assert_kv<T: KeyValueStore>() {}
        fn _assert_port<T: PortAdapter>() {}
    }

    #[test]
    fn ports_are_object_safe() {
        fn _backend(_: &dyn BackendAdapter) {}
        fn _realtime(_: &dyn RealtimeAdapter) {}
        fn _upload(_: &dyn UploadAdapter) {}
        fn _kv(_: &dyn KeyValueStore) {}
    }
}
