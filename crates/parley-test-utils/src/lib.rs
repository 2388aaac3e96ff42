// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a hosted backend.
//!
//! # Components
//!
//! - [`MockBackend`] - Scripted conversation backend with gates to force races
//! - [`InMemoryRealtime`] - Realtime hub with event injection and publish capture
//! - [`MockUploader`] - Object storage stand-in with a failure switch
//! - [`TestHarness`] - A [`parley_sync::ChatWidget`] wired to all of the above

pub mod harness;
pub mod mock_backend;
pub mod mock_uploader;
pub mod realtime_hub;

pub use harness::{TestHarness, TestHarnessBuilder, eventually, settle};
pub use mock_backend::MockBackend;
pub use mock_uploader::MockUploader;
pub use realtime_hub::InMemoryRealtime;
