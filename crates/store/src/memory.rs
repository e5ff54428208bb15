// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory reference `JobStore`, sufficient for tests and single-node
//! operation. Job rows are guarded by a version counter; invocation rows by
//! their own `mutations_count`, exactly as the save protocol expects.

use crate::error::StoreError;
use crate::traits::{InvocationPage, JobStore};
use async_trait::async_trait;
use crond_core::{Invocation, InvocationId, Job, JobId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

struct JobRow {
    job: Job,
    version: u64,
}

#[derive(Default)]
struct Inner {
    jobs: std::collections::HashMap<JobId, JobRow>,
    // Newest-first by construction: `InvocationId` sorts ascending-by-recency.
    invocations: std::collections::HashMap<JobId, BTreeMap<InvocationId, Invocation>>,
}

/// A `parking_lot`-guarded, process-local `JobStore`. Never durable; the
/// process restarting loses all state, which is fine for tests and is the
/// documented limitation for single-node operation (see DESIGN.md).
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_job(&self, id: &JobId) -> Result<Option<(Job, u64)>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.jobs.get(id).map(|row| (row.job.clone(), row.version)))
    }

    async fn put_job_cas(&self, job: &Job, expected_version: Option<u64>) -> Result<u64, StoreError> {
        let mut inner = self.inner.write();
        let next_version = match (inner.jobs.get(&job.id), expected_version) {
            (Some(row), Some(expected)) if row.version == expected => row.version + 1,
            (None, None) => 1,
            _ => return Err(StoreError::JobConflict(job.id.to_string())),
        };
        inner.jobs.insert(job.id.clone(), JobRow { job: job.clone(), version: next_version });
        Ok(next_version)
    }

    async fn list_enabled_jobs_by_project(&self, project: &str) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .jobs
            .values()
            .filter(|row| row.job.enabled && row.job.project() == project)
            .map(|row| row.job.clone())
            .collect())
    }

    async fn list_all_enabled_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.jobs.values().filter(|row| row.job.enabled).map(|row| row.job.clone()).collect())
    }

    async fn list_projects(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read();
        let mut projects: Vec<String> =
            inner.jobs.values().filter(|row| row.job.enabled).map(|row| row.job.project().to_string()).collect();
        projects.sort();
        projects.dedup();
        Ok(projects)
    }

    async fn get_invocation(&self, job: &JobId, id: InvocationId) -> Result<Option<Invocation>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.invocations.get(job).and_then(|m| m.get(&id)).cloned())
    }

    async fn invocation_exists(&self, job: &JobId, id: InvocationId) -> Result<bool, StoreError> {
        let inner = self.inner.read();
        Ok(inner.invocations.get(job).map(|m| m.contains_key(&id)).unwrap_or(false))
    }

    async fn put_invocation(&self, invocation: &Invocation) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner
            .invocations
            .entry(invocation.job_id.clone())
            .or_default()
            .insert(invocation.id, invocation.clone());
        Ok(())
    }

    async fn put_invocation_cas(
        &self,
        invocation: &Invocation,
        expected_current_mutations_count: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let job_invocations = inner.invocations.entry(invocation.job_id.clone()).or_default();
        let current = job_invocations
            .get(&invocation.id)
            .ok_or_else(|| StoreError::InvocationNotFound(invocation.job_id.to_string(), invocation.id.to_string()))?;
        if current.mutations_count != expected_current_mutations_count {
            return Err(StoreError::UpdateConflict(invocation.job_id.to_string(), invocation.id.to_string()));
        }
        job_invocations.insert(invocation.id, invocation.clone());
        Ok(())
    }

    async fn list_invocations(
        &self,
        job: &JobId,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<InvocationPage, StoreError> {
        let page_size = page_size.min(500).max(1) as usize;
        let skip: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let inner = self.inner.read();
        let all: Vec<&Invocation> = inner.invocations.get(job).map(|m| m.values().collect()).unwrap_or_default();
        let items: Vec<Invocation> = all.into_iter().skip(skip).take(page_size).cloned().collect();
        let next_cursor = if items.len() == page_size { Some((skip + page_size).to_string()) } else { None };
        Ok(InvocationPage { items, cursor: next_cursor })
    }

    async fn get_invocations_by_nonce(&self, job: &JobId, nonce: u64) -> Result<Vec<Invocation>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .invocations
            .get(job)
            .map(|m| m.values().filter(|inv| inv.invocation_nonce == nonce).cloned().collect())
            .unwrap_or_default())
    }
}
