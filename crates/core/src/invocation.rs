// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invocation entity: a single attempt (or overrun record) to run a Job's task.

use crate::id::{InvocationId, JobId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationStatus {
    Starting,
    Running,
    Succeeded,
    Failed,
    Aborted,
    Overrun,
}

crate::simple_display! {
    InvocationStatus {
        Starting => "STARTING",
        Running => "RUNNING",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Aborted => "ABORTED",
        Overrun => "OVERRUN",
    }
}

impl InvocationStatus {
    /// Final statuses are immutable except for appended debug-log text.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted | Self::Overrun)
    }
}

/// A single attempt (or overrun record) to run a Job's task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub job_id: JobId,
    pub id: InvocationId,
    pub started_ms: u64,
    pub finished_ms: Option<u64>,
    /// Retry chain key: multiple invocations may share a nonce; at most one
    /// of them is the job's current invocation.
    pub invocation_nonce: u64,
    pub triggered_by: String,
    pub revision: String,
    pub revision_url: String,
    /// Copy of the Job's task payload at the time this invocation launched.
    pub task: Vec<u8>,
    pub debug_log: String,
    pub retry_count: u32,
    pub status: InvocationStatus,
    pub view_url: String,
    /// Opaque backend-owned state, round-tripped through `TaskController`.
    pub task_data: Vec<u8>,
    /// Optimistic-concurrency witness; a successful save increments this by
    /// exactly one.
    pub mutations_count: u64,
}

impl Invocation {
    pub fn new_starting(
        job_id: JobId,
        id: InvocationId,
        invocation_nonce: u64,
        triggered_by: impl Into<String>,
        revision: impl Into<String>,
        revision_url: impl Into<String>,
        task: Vec<u8>,
        retry_count: u32,
        now_ms: u64,
    ) -> Self {
        Self {
            job_id,
            id,
            started_ms: now_ms,
            finished_ms: None,
            invocation_nonce,
            triggered_by: triggered_by.into(),
            revision: revision.into(),
            revision_url: revision_url.into(),
            task,
            debug_log: String::new(),
            retry_count,
            status: InvocationStatus::Starting,
            view_url: String::new(),
            task_data: Vec::new(),
            mutations_count: 0,
        }
    }

    pub fn new_overrun(
        job_id: JobId,
        id: InvocationId,
        now_ms: u64,
        overruns: u32,
        running_invocation_id: InvocationId,
    ) -> Self {
        let mut inv = Self {
            job_id,
            id,
            started_ms: now_ms,
            finished_ms: Some(now_ms),
            invocation_nonce: 0,
            triggered_by: String::new(),
            revision: String::new(),
            revision_url: String::new(),
            task: Vec::new(),
            debug_log: String::new(),
            retry_count: 0,
            status: InvocationStatus::Overrun,
            view_url: String::new(),
            task_data: Vec::new(),
            mutations_count: 1,
        };
        inv.append_debug_log(
            now_ms,
            &format!(
                "Tick fired while invocation {running_invocation_id} was still in flight \
                 (overrun #{overruns})"
            ),
        );
        inv
    }

    /// Append a timestamp-prefixed line to the in-memory debug log.
    pub fn append_debug_log(&mut self, now_ms: u64, line: &str) {
        if !self.debug_log.is_empty() {
            self.debug_log.push('\n');
        }
        self.debug_log.push_str(&format!("[{now_ms}] {line}"));
    }
}
