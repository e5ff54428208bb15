// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-support task backend: a configurable, call-recording `TaskBackend`
//! used by engine tests instead of a real external task manager.

#![cfg(any(test, feature = "test-support"))]

use crate::controller::{NotificationMessage, TaskBackend, TaskController};
use crate::error::BackendError;
use crond_core::InvocationStatus;
use parking_lot::Mutex;
use std::sync::Arc;

/// What a [`FakeTaskBackend`] should do on its next `launch_task` call.
#[derive(Debug, Clone)]
pub enum LaunchOutcome {
    /// Leave the invocation `RUNNING` as if the backend confirmed the launch.
    Running,
    /// Leave the invocation `SUCCEEDED` immediately (a synchronous backend).
    Succeeded,
    /// Return a transient error without advancing status past `STARTING`.
    TransientError(String),
    /// Return a permanent error without advancing status past `STARTING`.
    PermanentError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Launch { invocation_nonce: u64, retry_count_hint: bool },
    Abort,
    Notify { message_id: String },
}

#[derive(Default)]
struct State {
    calls: Vec<RecordedCall>,
    next_launch: Vec<LaunchOutcome>,
}

/// A `TaskBackend` whose behavior is scripted by the test via
/// [`FakeTaskBackend::push_launch_outcome`], and whose calls are recorded
/// for later assertion.
#[derive(Clone)]
pub struct FakeTaskBackend {
    name: String,
    state: Arc<Mutex<State>>,
}

impl FakeTaskBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: Arc::new(Mutex::new(State::default())) }
    }

    /// Queue the outcome the next `launch_task` call should produce. Calls
    /// beyond the queued outcomes default to `Running`.
    pub fn push_launch_outcome(&self, outcome: LaunchOutcome) {
        self.state.lock().next_launch.push(outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }
}

#[async_trait::async_trait]
impl TaskBackend for FakeTaskBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn launch_task(&self, ctl: &mut dyn TaskController) -> Result<(), BackendError> {
        let outcome = {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall::Launch {
                invocation_nonce: ctl.invocation_nonce(),
                retry_count_hint: true,
            });
            if state.next_launch.is_empty() {
                LaunchOutcome::Running
            } else {
                state.next_launch.remove(0)
            }
        };
        match outcome {
            LaunchOutcome::Running => {
                ctl.set_status(InvocationStatus::Running);
                Ok(())
            }
            LaunchOutcome::Succeeded => {
                ctl.set_status(InvocationStatus::Succeeded);
                Ok(())
            }
            LaunchOutcome::TransientError(msg) => Err(BackendError::Transient(msg)),
            LaunchOutcome::PermanentError(msg) => Err(BackendError::Permanent(msg)),
        }
    }

    async fn abort_task(&self, _ctl: &mut dyn TaskController) -> Result<(), BackendError> {
        self.state.lock().calls.push(RecordedCall::Abort);
        Ok(())
    }

    async fn handle_notification(
        &self,
        ctl: &mut dyn TaskController,
        msg: &NotificationMessage,
    ) -> Result<(), BackendError> {
        self.state.lock().calls.push(RecordedCall::Notify { message_id: msg.message_id.clone() });
        ctl.set_status(InvocationStatus::Succeeded);
        Ok(())
    }

    fn validate_payload(&self, _task: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }
}
