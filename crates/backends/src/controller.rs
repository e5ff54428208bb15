// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `TaskController` boundary a pluggable `TaskBackend` is handed. The
//! concrete implementation (which also drives the save protocol) lives in
//! `crond-engine`; this crate only owns the interface so backends don't need
//! to depend on the engine.

use crate::error::BackendError;
use async_trait::async_trait;
use crond_core::{InvocationId, InvocationStatus, JobId};
use std::collections::HashMap;

/// An inbound completion message, as delivered by a push subscription or a
/// pull-loop iteration.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub attributes: HashMap<String, String>,
    pub data: Vec<u8>,
    pub message_id: String,
}

impl NotificationMessage {
    pub fn auth_token(&self) -> Option<&str> {
        self.attributes.get("auth_token").map(String::as_str)
    }
}

/// Per-invocation handle given to a task backend for the duration of one
/// `LaunchTask`/`AbortTask`/`HandleNotification` call.
#[async_trait]
pub trait TaskController: Send {
    fn job_id(&self) -> &JobId;
    fn invocation_id(&self) -> InvocationId;
    fn invocation_nonce(&self) -> u64;
    fn task(&self) -> &[u8];

    fn status(&self) -> InvocationStatus;
    fn set_status(&mut self, status: InvocationStatus);

    fn view_url(&self) -> &str;
    fn set_view_url(&mut self, url: String);

    fn task_data(&self) -> &[u8];
    fn set_task_data(&mut self, data: Vec<u8>);

    /// Append a line to the in-memory debug log, flushed on `save`.
    fn debug_log(&mut self, line: &str);

    /// Provision (once, amortized) a notification topic for `publisher` and
    /// mint a bound auth token. See §4.6.
    async fn prepare_topic(&mut self, publisher: &str) -> Result<(String, String), BackendError>;
}

/// A pluggable task backend: the capability set the Engine dispatches to by
/// payload type tag.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn launch_task(&self, ctl: &mut dyn TaskController) -> Result<(), BackendError>;

    async fn abort_task(&self, ctl: &mut dyn TaskController) -> Result<(), BackendError>;

    async fn handle_notification(
        &self,
        ctl: &mut dyn TaskController,
        msg: &NotificationMessage,
    ) -> Result<(), BackendError>;

    fn validate_payload(&self, task: &[u8]) -> Result<(), BackendError>;
}
