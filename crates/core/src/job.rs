// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job entity and its persisted state-machine position.

use crate::id::{InvocationId, JobId};
use serde::{Deserialize, Serialize};

/// The tag a Job's `state` can carry. `STARTING` and `OVERRUN` are
/// deliberately absent: they are properties of the current Invocation, not
/// of the Job row itself (see the state machine's design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStateTag {
    Disabled,
    Scheduled,
    Queued,
    Running,
    Suspended,
}

crate::simple_display! {
    JobStateTag {
        Disabled => "DISABLED",
        Scheduled => "SCHEDULED",
        Queued => "QUEUED",
        Running => "RUNNING",
        Suspended => "SUSPENDED",
    }
}

/// The Job's current position in the state machine, plus the nonces that
/// let the machine tell a fresh action apart from a stale retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub state: JobStateTag,
    /// Rotated whenever the schedule changes; a `TimerTick` carrying a
    /// different nonce than this one is stale and ignored.
    pub tick_nonce: u64,
    /// When the next `TimerTick` is expected to arrive (epoch ms), if armed.
    pub tick_time_ms: Option<u64>,
    /// Nonce minted for the invocation currently being started/run.
    pub invocation_nonce: u64,
    /// When `invocation_nonce` was minted (epoch ms).
    pub invocation_time_ms: Option<u64>,
    /// The invocation the Job currently considers "current". Zero means none.
    pub invocation_id: InvocationId,
    /// The previous tick time, kept for overrun bookkeeping and debugging.
    pub prev_time_ms: Option<u64>,
}

impl JobState {
    pub fn disabled() -> Self {
        Self {
            state: JobStateTag::Disabled,
            tick_nonce: 0,
            tick_time_ms: None,
            invocation_nonce: 0,
            invocation_time_ms: None,
            invocation_id: InvocationId::ZERO,
            prev_time_ms: None,
        }
    }

    /// Whether a `TimerTick(nonce)` arriving now is the one this state is
    /// waiting for, rather than a stale retry or duplicate delivery.
    pub fn is_expecting_tick(&self, nonce: u64) -> bool {
        self.tick_nonce != 0 && self.tick_nonce == nonce
    }

    /// Whether an invocation lifecycle event carrying `nonce` corresponds to
    /// the invocation this state is currently tracking.
    pub fn is_expecting_invocation(&self, nonce: u64) -> bool {
        self.invocation_nonce != 0 && self.invocation_nonce == nonce
    }

    /// Whether the job is mid-flight: an invocation has been requested or is
    /// running, so a new tick should overrun rather than start a second one.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, JobStateTag::Queued | JobStateTag::Running)
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::disabled()
    }
}

/// The persistent description of a recurring task plus its current state
/// machine position. Identified by `JobId = "<project>/<name>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub enabled: bool,
    pub paused: bool,
    pub revision: String,
    pub revision_url: String,
    /// Cron-like expression, or the literal `"manual"`. When `paused` the
    /// effective schedule is always `"manual"` regardless of this field.
    pub schedule: String,
    /// Opaque payload for the task backend; the engine never interprets it.
    pub task: Vec<u8>,
    pub state: JobState,
}

impl Job {
    pub fn new(id: JobId, schedule: impl Into<String>, task: Vec<u8>) -> Self {
        Self {
            id,
            enabled: true,
            paused: false,
            revision: String::new(),
            revision_url: String::new(),
            schedule: schedule.into(),
            task,
            state: JobState::disabled(),
        }
    }

    /// The schedule actually driving the state machine: `"manual"` while
    /// paused, the configured expression otherwise.
    pub fn effective_schedule(&self) -> &str {
        if self.paused {
            "manual"
        } else {
            &self.schedule
        }
    }

    pub fn project(&self) -> &str {
        self.id.project()
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn builder(id: JobId) -> JobBuilder {
        JobBuilder { job: Self::new(id, "manual", Vec::new()) }
    }
}

/// Test-only builder for [`Job`].
#[cfg(any(test, feature = "test-support"))]
pub struct JobBuilder {
    job: Job,
}

#[cfg(any(test, feature = "test-support"))]
impl JobBuilder {
    pub fn schedule(mut self, schedule: impl Into<String>) -> Self {
        self.job.schedule = schedule.into();
        self
    }

    pub fn task(mut self, task: Vec<u8>) -> Self {
        self.job.task = task;
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.job.paused = paused;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.job.enabled = enabled;
        self
    }

    pub fn state(mut self, state: JobState) -> Self {
        self.job.state = state;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_id() -> JobId {
        JobId::parse("abc/1").unwrap()
    }

    #[test]
    fn effective_schedule_is_manual_when_paused() {
        let mut job = Job::new(job_id(), "*/5 * * * * * *", Vec::new());
        assert_eq!(job.effective_schedule(), "*/5 * * * * * *");
        job.paused = true;
        assert_eq!(job.effective_schedule(), "manual");
    }

    #[test]
    fn new_job_starts_disabled() {
        let job = Job::new(job_id(), "manual", Vec::new());
        assert_eq!(job.state.state, JobStateTag::Disabled);
        assert!(job.enabled);
    }

    #[yare::parameterized(
        disabled  = { JobStateTag::Disabled,  false },
        scheduled = { JobStateTag::Scheduled, false },
        queued    = { JobStateTag::Queued,    true },
        running   = { JobStateTag::Running,   true },
        suspended = { JobStateTag::Suspended, false },
    )]
    fn busy_iff_queued_or_running(tag: JobStateTag, expected: bool) {
        let state = JobState { state: tag, ..JobState::disabled() };
        assert_eq!(state.is_busy(), expected);
    }

    proptest::proptest! {
        #[test]
        fn state_tag_serde_roundtrip(tag in crate::test_support::strategies::arb_job_state_tag()) {
            let json = serde_json::to_string(&tag).unwrap();
            let parsed: JobStateTag = serde_json::from_str(&json).unwrap();
            proptest::prop_assert_eq!(tag, parsed);
        }
    }

    #[test]
    fn nonce_matching_rejects_stale_and_zero() {
        let mut state = JobState::disabled();
        state.tick_nonce = 42;
        assert!(state.is_expecting_tick(42));
        assert!(!state.is_expecting_tick(41));
        assert!(!state.is_expecting_tick(0));
    }
}
