// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! crond-backends: the pluggable adapter boundary — `TaskController`,
//! `TaskBackend`, and `ActionQueue` — plus an in-memory reference queue and
//! a scripted fake backend for tests.

pub mod controller;
pub mod error;
pub mod log_backend;
pub mod queue;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use controller::{NotificationMessage, TaskBackend, TaskController};
pub use error::BackendError;
pub use log_backend::LogBackend;
pub use queue::{ActionQueue, MemoryActionQueue, QueueError, QueueName, QueuedTask};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTaskBackend, LaunchOutcome, RecordedCall};
