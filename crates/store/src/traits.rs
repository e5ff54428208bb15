// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transactional store contract (§4.7). Job mutation uses an opaque
//! version witness rather than an exposed closure-based transaction, so the
//! trait stays object-safe; the Engine's retry loop (§5) drives the
//! read-mutate-CAS cycle against these primitives.

use crate::error::StoreError;
use async_trait::async_trait;
use crond_core::{Invocation, InvocationId, Job, JobId};

/// A page of invocations plus an opaque continuation cursor.
pub struct InvocationPage {
    pub items: Vec<Invocation>,
    pub cursor: Option<String>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Read a job and the opaque version it was stored under, for a
    /// subsequent `put_job_cas`.
    async fn get_job(&self, id: &JobId) -> Result<Option<(Job, u64)>, StoreError>;

    /// Write `job`. `expected_version` must be exactly what the preceding
    /// `get_job` returned: `Some(v)` if a row existed, `None` if it did not.
    /// Any mismatch — someone else created, updated, or raced the row since
    /// that read — fails with `StoreError::JobConflict`, and the caller
    /// retries under a fresh read per §5's attempt budget.
    async fn put_job_cas(&self, job: &Job, expected_version: Option<u64>) -> Result<u64, StoreError>;

    /// Enabled jobs scoped to one project.
    async fn list_enabled_jobs_by_project(&self, project: &str) -> Result<Vec<Job>, StoreError>;

    /// Every enabled job across all projects.
    async fn list_all_enabled_jobs(&self) -> Result<Vec<Job>, StoreError>;

    /// Distinct project names with at least one enabled job.
    async fn list_projects(&self) -> Result<Vec<String>, StoreError>;

    async fn get_invocation(&self, job: &JobId, id: InvocationId) -> Result<Option<Invocation>, StoreError>;

    async fn invocation_exists(&self, job: &JobId, id: InvocationId) -> Result<bool, StoreError>;

    /// Write `invocation` unconditionally. Used for the `recordOverrun` path
    /// and the initial `STARTING` row, which have no prior version to race
    /// against.
    async fn put_invocation(&self, invocation: &Invocation) -> Result<(), StoreError>;

    /// Write `invocation` iff the currently-stored row's `mutations_count`
    /// equals `expected_current_mutations_count` (the save protocol's CAS,
    /// §4.4 step 4).
    async fn put_invocation_cas(
        &self,
        invocation: &Invocation,
        expected_current_mutations_count: u64,
    ) -> Result<(), StoreError>;

    /// Invocations under `job`, newest first, paginated. `page_size` is
    /// capped at 500 by callers per §6.
    async fn list_invocations(
        &self,
        job: &JobId,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<InvocationPage, StoreError>;

    async fn get_invocations_by_nonce(&self, job: &JobId, nonce: u64) -> Result<Vec<Invocation>, StoreError>;
}
