// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A trivial reference `TaskBackend`: "runs" a task by logging its payload
//! and immediately succeeding. Useful for smoke-testing a deployment's
//! wiring (store, queue, engine) without standing up a real downstream
//! task runner.

use crate::controller::{NotificationMessage, TaskBackend, TaskController};
use crate::error::BackendError;
use crond_core::InvocationStatus;
use tracing::info;

pub struct LogBackend {
    name: String,
}

impl LogBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait::async_trait]
impl TaskBackend for LogBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn launch_task(&self, ctl: &mut dyn TaskController) -> Result<(), BackendError> {
        info!(
            job_id = %ctl.job_id(),
            invocation_id = %ctl.invocation_id(),
            payload_len = ctl.task().len(),
            "log backend running task"
        );
        ctl.debug_log("ran via log backend");
        ctl.set_status(InvocationStatus::Succeeded);
        Ok(())
    }

    async fn abort_task(&self, ctl: &mut dyn TaskController) -> Result<(), BackendError> {
        info!(job_id = %ctl.job_id(), invocation_id = %ctl.invocation_id(), "log backend abort requested");
        Ok(())
    }

    async fn handle_notification(
        &self,
        _ctl: &mut dyn TaskController,
        _msg: &NotificationMessage,
    ) -> Result<(), BackendError> {
        // This backend never provisions a topic, so it never receives one.
        Err(BackendError::Permanent("log backend does not accept notifications".into()))
    }

    fn validate_payload(&self, _task: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crond_core::{InvocationId, JobId};
    use std::collections::HashMap;

    struct FakeController {
        job_id: JobId,
        invocation_id: InvocationId,
        task: Vec<u8>,
        status: InvocationStatus,
        debug_log: Vec<String>,
    }

    #[async_trait]
    impl TaskController for FakeController {
        fn job_id(&self) -> &JobId {
            &self.job_id
        }
        fn invocation_id(&self) -> InvocationId {
            self.invocation_id
        }
        fn invocation_nonce(&self) -> u64 {
            1
        }
        fn task(&self) -> &[u8] {
            &self.task
        }
        fn status(&self) -> InvocationStatus {
            self.status
        }
        fn set_status(&mut self, status: InvocationStatus) {
            self.status = status;
        }
        fn view_url(&self) -> &str {
            ""
        }
        fn set_view_url(&mut self, _url: String) {}
        fn task_data(&self) -> &[u8] {
            &[]
        }
        fn set_task_data(&mut self, _data: Vec<u8>) {}
        fn debug_log(&mut self, line: &str) {
            self.debug_log.push(line.to_string());
        }
        async fn prepare_topic(&mut self, _publisher: &str) -> Result<(String, String), BackendError> {
            Err(BackendError::Permanent("not supported in test".into()))
        }
    }

    fn ctl() -> FakeController {
        FakeController {
            job_id: JobId::parse("abc/1").unwrap(),
            invocation_id: InvocationId::build(1_000, 1),
            task: vec![1, 2, 3],
            status: InvocationStatus::Starting,
            debug_log: Vec::new(),
        }
    }

    #[tokio::test]
    async fn launch_task_always_succeeds() {
        let backend = LogBackend::new("log");
        let mut controller = ctl();
        backend.launch_task(&mut controller).await.unwrap();
        assert_eq!(controller.status, InvocationStatus::Succeeded);
        assert!(!controller.debug_log.is_empty());
    }

    #[tokio::test]
    async fn handle_notification_is_rejected() {
        let backend = LogBackend::new("log");
        let mut controller = ctl();
        let msg = NotificationMessage { attributes: HashMap::new(), data: Vec::new(), message_id: "m1".into() };
        assert!(backend.handle_notification(&mut controller, &msg).await.is_err());
    }
}
