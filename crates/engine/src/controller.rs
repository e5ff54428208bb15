// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The concrete `TaskController`: the per-invocation handle given to a task
//! backend, and the save protocol (§4.4) that commits its mutations back.
//!
//! Holds a cheap `Engine` clone for the transactional work `save()` needs,
//! rather than a borrow — the cyclic controller/engine relationship is
//! broken by ownership direction alone: the engine never holds onto a
//! controller past the `LaunchTask`/`AbortTask`/`HandleNotification` call
//! that created it.

use crate::engine::Engine;
use crate::error::EngineError;
use async_trait::async_trait;
use crond_backends::{ActionQueue, BackendError, TaskController};
use crond_core::{Clock, Invocation, InvocationId, InvocationStatus, JobId};
use crond_store::JobStore;

/// Per-invocation handle backing the `TaskController` trait object a
/// `TaskBackend` is given.
pub struct EngineController<S, Q, C> {
    engine: Engine<S, Q, C>,
    job_id: JobId,
    invocation_id: InvocationId,
    invocation_nonce: u64,
    backend_name: String,
    payload: Vec<u8>,
    saved: Invocation,
    status: InvocationStatus,
    view_url: String,
    task_data: Vec<u8>,
    debug_log_delta: String,
    suppress_job_update: bool,
}

impl<S, Q, C> EngineController<S, Q, C>
where
    S: JobStore,
    Q: ActionQueue,
    C: Clock,
{
    pub(crate) fn new(
        engine: Engine<S, Q, C>,
        job_id: JobId,
        backend_name: String,
        payload: Vec<u8>,
        invocation: Invocation,
    ) -> Self {
        Self {
            engine,
            job_id,
            invocation_id: invocation.id,
            invocation_nonce: invocation.invocation_nonce,
            backend_name,
            payload,
            status: invocation.status,
            view_url: invocation.view_url.clone(),
            task_data: invocation.task_data.clone(),
            saved: invocation,
            debug_log_delta: String::new(),
            suppress_job_update: false,
        }
    }

    /// Suppress the job-state update on the next `save()` so the job stays
    /// `QUEUED` and a later queued delivery retries `startInvocation` (§4.3).
    pub fn suppress_job_update(&mut self) {
        self.suppress_job_update = true;
    }

    pub fn saved_snapshot(&self) -> &Invocation {
        &self.saved
    }

    /// The two-phase commit described in §4.4: project the mutable state
    /// plus debug-log delta onto the originally-read snapshot, CAS it in,
    /// then drive whatever job-level state transition the status change
    /// implies (unless suppressed).
    pub async fn save(&mut self) -> Result<(), EngineError> {
        let now_ms = self.engine.now_ms();
        let mut saving = self.saved.clone();
        let changed = saving.status != self.status
            || saving.view_url != self.view_url
            || saving.task_data != self.task_data
            || !self.debug_log_delta.is_empty();
        if !changed {
            return Ok(());
        }

        let was_starting = saving.status == InvocationStatus::Starting;
        let becomes_final = self.status.is_final() && !saving.status.is_final();

        saving.status = self.status;
        saving.view_url = self.view_url.clone();
        saving.task_data = self.task_data.clone();
        for line in self.debug_log_delta.split('\n').filter(|l| !l.is_empty()) {
            saving.append_debug_log(now_ms, line);
        }
        saving.mutations_count = self.saved.mutations_count + 1;
        if becomes_final {
            saving.finished_ms = Some(now_ms);
            saving.append_debug_log(now_ms, &format!("Invocation {}", saving.status));
        }

        self.engine.put_invocation_cas(&saving, self.saved.mutations_count).await?;

        if !self.suppress_job_update {
            self.engine
                .apply_invocation_transition(&self.job_id, self.invocation_id, was_starting, &saving)
                .await?;
        }

        self.saved = saving;
        self.debug_log_delta.clear();
        Ok(())
    }
}

#[async_trait]
impl<S, Q, C> TaskController for EngineController<S, Q, C>
where
    S: JobStore,
    Q: ActionQueue,
    C: Clock,
{
    fn job_id(&self) -> &JobId {
        &self.job_id
    }

    fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }

    fn invocation_nonce(&self) -> u64 {
        self.invocation_nonce
    }

    fn task(&self) -> &[u8] {
        &self.payload
    }

    fn status(&self) -> InvocationStatus {
        self.status
    }

    fn set_status(&mut self, status: InvocationStatus) {
        self.status = status;
    }

    fn view_url(&self) -> &str {
        &self.view_url
    }

    fn set_view_url(&mut self, url: String) {
        self.view_url = url;
    }

    fn task_data(&self) -> &[u8] {
        &self.task_data
    }

    fn set_task_data(&mut self, data: Vec<u8>) {
        self.task_data = data;
    }

    fn debug_log(&mut self, line: &str) {
        if !self.debug_log_delta.is_empty() {
            self.debug_log_delta.push('\n');
        }
        self.debug_log_delta.push_str(line);
    }

    async fn prepare_topic(&mut self, publisher: &str) -> Result<(String, String), BackendError> {
        self.engine
            .prepare_topic(&self.job_id, self.invocation_id, &self.backend_name, publisher)
            .await
            .map_err(|e| if e.is_transient() { BackendError::Transient(e.to_string()) } else { BackendError::Permanent(e.to_string()) })
    }
}
