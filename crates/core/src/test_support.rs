// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::id::{InvocationId, JobId};
use crate::invocation::{Invocation, InvocationStatus};
use crate::job::{Job, JobState, JobStateTag};

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::invocation::InvocationStatus;
    use crate::job::JobStateTag;
    use proptest::prelude::*;

    pub fn arb_job_state_tag() -> impl Strategy<Value = JobStateTag> {
        prop_oneof![
            Just(JobStateTag::Disabled),
            Just(JobStateTag::Scheduled),
            Just(JobStateTag::Queued),
            Just(JobStateTag::Running),
            Just(JobStateTag::Suspended),
        ]
    }

    pub fn arb_invocation_status() -> impl Strategy<Value = InvocationStatus> {
        prop_oneof![
            Just(InvocationStatus::Starting),
            Just(InvocationStatus::Running),
            Just(InvocationStatus::Succeeded),
            Just(InvocationStatus::Failed),
            Just(InvocationStatus::Aborted),
            Just(InvocationStatus::Overrun),
        ]
    }

    /// A job ID made of two alphanumeric segments, matching `JobId`'s
    /// `"<project>/<name>"` invariant.
    pub fn arb_job_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{1,8}/[a-z][a-z0-9]{1,8}"
    }
}

pub fn job_id(s: &str) -> JobId {
    JobId::parse(s).expect("test job id must be valid")
}

pub fn new_job(id: &str, schedule: &str) -> Job {
    Job::new(job_id(id), schedule, Vec::new())
}

pub fn starting_invocation(job: &str, seq_ms: u64) -> Invocation {
    Invocation::new_starting(
        job_id(job),
        InvocationId::build(seq_ms, 0),
        1,
        "test",
        "rev1",
        "",
        Vec::new(),
        0,
        seq_ms,
    )
}

pub fn final_invocation(job: &str, seq_ms: u64, status: InvocationStatus) -> Invocation {
    let mut inv = starting_invocation(job, seq_ms);
    inv.status = status;
    inv.finished_ms = Some(seq_ms + 1);
    inv
}

pub fn scheduled_state(tick_nonce: u64, tick_time_ms: u64) -> JobState {
    JobState {
        state: JobStateTag::Scheduled,
        tick_nonce,
        tick_time_ms: Some(tick_time_ms),
        ..JobState::disabled()
    }
}
