// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port traits the sync core depends on.
//!
//! Every port extends the [`PortAdapter`] base trait. Async ports use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod backend;
pub mod realtime;
pub mod storage;
pub mod upload;

pub use adapter::PortAdapter;
pub use backend::BackendAdapter;
pub use realtime::{RealtimeAdapter, Subscription};
pub use storage::{KeyValueStore, StorageField, StorageKey};
pub use upload::UploadAdapter;
