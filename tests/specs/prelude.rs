// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scenario harness: a fully-wired `Engine` over the in-memory
//! reference store/queue plus a scripted `FakeTaskBackend`, and the
//! `JobDefinition`/clock helpers every S1-S8 scenario needs.

pub use crond_backends::{FakeTaskBackend, LaunchOutcome, MemoryActionQueue, QueuedTask};
pub use crond_core::test_support::job_id;
pub use crond_core::{ActionPayload, Clock, FakeClock, InvocationId, InvocationStatus, Job, JobStateTag};
pub use crond_engine::{Engine, EngineError, JobDefinition, UpdateSummary};
pub use crond_store::MemoryJobStore;

use std::sync::Arc;
use std::time::Duration;

pub type ScenarioEngine = Engine<MemoryJobStore, MemoryActionQueue, FakeClock>;

/// The "backend" name every scenario job targets by default.
pub const BACKEND: &str = "fake";

pub struct Harness {
    pub engine: ScenarioEngine,
    pub queue: MemoryActionQueue,
    pub clock: FakeClock,
    pub backend: FakeTaskBackend,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryJobStore::new();
        let queue = MemoryActionQueue::new();
        let clock = FakeClock::new();
        let backend = FakeTaskBackend::new(BACKEND);
        let mut registry = crond_engine::BackendRegistry::new();
        registry.register(Arc::new(backend.clone()));
        let engine = Engine::new(
            store,
            queue.clone(),
            clock.clone(),
            registry,
            b"spec-harness-secret".to_vec(),
            "specs",
            "cron",
        );
        Self { engine, queue, clock, backend }
    }

    /// The epoch-ms a new `Harness` starts at — `FakeClock::new()`'s fixed
    /// starting point, stood in for the scenarios' `T`.
    pub fn epoch_t(&self) -> u64 {
        self.clock.epoch_ms()
    }

    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Drain every task due as of the clock's current time.
    pub fn drain_due(&self) -> Vec<QueuedTask> {
        self.queue.drain_due(self.clock.epoch_ms())
    }

    pub fn def(&self, id: &str, schedule: &str) -> JobDefinition {
        JobDefinition {
            id: job_id(id),
            schedule: schedule.to_string(),
            backend: BACKEND.to_string(),
            payload: b"{}".to_vec(),
            revision: "rev1".to_string(),
            revision_url: String::new(),
        }
    }

    pub async fn job(&self, id: &str) -> Job {
        self.engine.get_cron_job(&job_id(id)).await.expect("job must exist")
    }
}
