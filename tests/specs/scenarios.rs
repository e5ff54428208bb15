// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The §8 end-to-end scenarios (S1-S8), each driven against the
//! `Harness`'s in-memory store/queue/backend through the public `Engine`
//! surface only — no reaching into private module internals.

use crate::prelude::*;
use crond_core::ActionPayload;
use std::time::Duration;

/// Every `*/5s`-class tick for a given job lands at the same sub-second
/// dispersion offset (§4.1) each time, since it's seeded by the job ID
/// alone — so `t + 5000*n + dispersion("abc/1")` predicts every tick this
/// job ever arms.
fn dispersion_ms(job: &str) -> u64 {
    crond_core::fnv64_seed(job) % 1_000
}

/// S1: pushing a fresh job definition schedules its first tick and queues
/// exactly one timer task; no invocation is queued yet.
#[tokio::test]
async fn s1_create_and_tick() {
    let h = Harness::new();
    let t = h.epoch_t();
    let disp = dispersion_ms("abc/1");

    let summary = h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();
    assert_eq!(summary, UpdateSummary { updated: 1, unchanged: 0, disabled: 0 });

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Scheduled);
    assert_eq!(job.state.tick_time_ms, Some(t + 5_000 + disp));

    assert_eq!(h.queue.len(), 1);
    let queued = h.queue.queued_for(&job_id("abc/1"));
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].not_before_ms, t + 5_000 + disp);
    assert!(matches!(queued[0].payload, ActionPayload::TickLater { .. }));
}

/// S2: re-pushing the identical config is a no-op — no new queue adds, no
/// state change.
#[tokio::test]
async fn s2_identical_repush_is_noop() {
    let h = Harness::new();
    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();
    let before = h.job("abc/1").await;
    let queue_len_before = h.queue.len();

    let summary = h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();
    assert_eq!(summary, UpdateSummary { updated: 0, unchanged: 1, disabled: 0 });

    let after = h.job("abc/1").await;
    assert_eq!(after.state.tick_nonce, before.state.tick_nonce);
    assert_eq!(after.state.tick_time_ms, before.state.tick_time_ms);
    assert_eq!(h.queue.len(), queue_len_before);
}

/// S3: a tick fires, the backend's first launch attempt fails transiently,
/// and a queue redelivery with an incremented retry count succeeds.
#[tokio::test]
async fn s3_tick_fires_launch_fails_transient_then_retry_succeeds() {
    let h = Harness::new();
    let t = h.epoch_t();
    h.backend.push_launch_outcome(LaunchOutcome::TransientError("backend unavailable".into()));

    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();

    h.advance(Duration::from_secs(5));
    let tick = h.queue.queued_for(&job_id("abc/1")).into_iter().next().unwrap();
    h.engine.execute_serialized_action(tick.payload, tick.retry_count).await.unwrap();

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Queued);

    let queued = h.queue.queued_for(&job_id("abc/1"));
    let next_tick = queued.iter().find(|task| matches!(task.payload, ActionPayload::TickLater { .. })).unwrap();
    assert_eq!(next_tick.not_before_ms, t + 10_000 + dispersion_ms("abc/1"));
    let start = queued.iter().find(|task| matches!(task.payload, ActionPayload::StartInvocation { .. })).unwrap().clone();
    assert_eq!(start.not_before_ms, t + 5_000 + 1_000);

    // First attempt: backend rejects the launch transiently.
    let err = h.engine.execute_serialized_action(start.payload.clone(), start.retry_count).await.unwrap_err();
    assert!(err.is_transient());

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Queued, "a retriable failure must leave the job QUEUED");
    let invocation_id = job.state.invocation_id;
    let first = h.engine.get_invocation(&job_id("abc/1"), invocation_id).await.unwrap();
    assert_eq!(first.status, InvocationStatus::Failed);
    assert!(first.debug_log.contains("Invocation initiated (attempt 1)"));
    assert!(first.debug_log.contains("It will probably be retried"));

    // Redelivery with an incremented retry count: the backend now succeeds.
    h.backend.push_launch_outcome(LaunchOutcome::Succeeded);
    h.engine.execute_serialized_action(start.payload, 1).await.unwrap();

    let first_again = h.engine.get_invocation(&job_id("abc/1"), invocation_id).await.unwrap();
    assert_eq!(first_again.status, InvocationStatus::Failed, "the first attempt's row never changes after the fact");

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Scheduled);
    assert!(job.state.invocation_id.is_zero());

    let by_nonce = h.engine.get_invocations_by_nonce(&job_id("abc/1"), first.invocation_nonce).await.unwrap();
    assert_eq!(by_nonce.len(), 2, "one retry chain, two attempts");
    let second = by_nonce.iter().find(|inv| inv.id != first.id).unwrap();
    assert_eq!(second.status, InvocationStatus::Succeeded);
    assert_eq!(second.retry_count, 1);
}

/// S4: dropping a job from a project's pushed config disables (not
/// deletes) it and leaves nothing queued.
#[tokio::test]
async fn s4_removed_from_config_is_disabled() {
    let h = Harness::new();
    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();

    let summary = h.engine.update_project_jobs("abc", vec![]).await.unwrap();
    assert_eq!(summary, UpdateSummary { updated: 0, unchanged: 0, disabled: 1 });

    let job = h.job("abc/1").await;
    assert!(!job.enabled, "the row survives for audit, just flipped to disabled");
    assert_eq!(job.state.state, JobStateTag::Disabled);
    assert!(h.queue.is_empty());
}

/// S5: triggering a manual-schedule job that is currently suspended starts
/// a new invocation chain and records the caller as `triggeredBy`.
#[tokio::test]
async fn s5_manual_trigger_on_suspended_manual_job() {
    let h = Harness::new();
    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "manual")]).await.unwrap();
    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Suspended, "OnJobEnabled with a manual effective schedule lands in SUSPENDED");
    assert!(h.queue.is_empty(), "a manual schedule never arms a timer tick");

    let nonce = h.engine.trigger_invocation(&job_id("abc/1"), "user:who").await.unwrap();
    assert_ne!(nonce, 0);

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Queued);

    let start = h.queue.queued_for(&job_id("abc/1")).into_iter().next().unwrap();
    h.engine.execute_serialized_action(start.payload, start.retry_count).await.unwrap();

    // The invocation launches synchronously (`FakeTaskBackend` defaults to
    // RUNNING), so find it by its nonce rather than the job's current
    // pointer, which the subsequent lifecycle events may have moved on from.
    let by_nonce = h.engine.get_invocations_by_nonce(&job_id("abc/1"), nonce).await.unwrap();
    assert_eq!(by_nonce.len(), 1);
    assert_eq!(by_nonce[0].triggered_by, "user:who");
}

/// S6: aborting a running invocation force-finalizes it and returns the job
/// to its post-done state with no current invocation.
#[tokio::test]
async fn s6_abort_running_invocation() {
    let h = Harness::new();
    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();

    h.advance(Duration::from_secs(5));
    let tick = h.queue.queued_for(&job_id("abc/1")).into_iter().next().unwrap();
    h.engine.execute_serialized_action(tick.payload, tick.retry_count).await.unwrap();
    let start = h
        .drain_due()
        .into_iter()
        .find(|t| matches!(t.payload, ActionPayload::StartInvocation { .. }))
        .unwrap();
    h.engine.execute_serialized_action(start.payload, start.retry_count).await.unwrap();

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Running, "FakeTaskBackend's default outcome leaves the invocation RUNNING");
    let invocation_id = job.state.invocation_id;
    assert!(!invocation_id.is_zero());

    h.engine.abort_invocation(&job_id("abc/1"), invocation_id, "user:who").await.unwrap();

    let inv = h.engine.get_invocation(&job_id("abc/1"), invocation_id).await.unwrap();
    assert_eq!(inv.status, InvocationStatus::Aborted);
    assert!(inv.debug_log.contains("Aborted by user:who"));
    assert!(h.backend.calls().iter().any(|c| matches!(c, crond_backends::RecordedCall::Abort)));

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Scheduled, "a recurring job returns to SCHEDULED, not SUSPENDED");
    assert!(job.state.invocation_id.is_zero());

    // Idempotent: aborting an already-final invocation is a no-op, not an error.
    h.engine.abort_invocation(&job_id("abc/1"), invocation_id, "user:who").await.unwrap();
}

/// Overrun semantics (§8 testable property 7): a tick that arrives while the
/// prior invocation is still in flight records an `OVERRUN` invocation and
/// starts nothing new.
#[tokio::test]
async fn overrun_tick_while_busy_records_without_new_launch() {
    let h = Harness::new();
    let t = h.epoch_t();
    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();

    h.advance(Duration::from_secs(5));
    let tick = h.queue.queued_for(&job_id("abc/1")).into_iter().next().unwrap();
    h.engine.execute_serialized_action(tick.payload, tick.retry_count).await.unwrap();
    let start = h
        .drain_due()
        .into_iter()
        .find(|task| matches!(task.payload, ActionPayload::StartInvocation { .. }))
        .unwrap();
    h.engine.execute_serialized_action(start.payload, start.retry_count).await.unwrap();

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Running);
    let running_id = job.state.invocation_id;

    // The next tick (T+10s) arrives while the invocation above is still
    // running.
    h.advance(Duration::from_secs(5));
    assert_eq!(h.epoch_t(), t + 10_000);
    let second_tick = h
        .drain_due()
        .into_iter()
        .find(|task| matches!(task.payload, ActionPayload::TickLater { .. }))
        .unwrap();
    h.engine.execute_serialized_action(second_tick.payload, second_tick.retry_count).await.unwrap();

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Running, "still busy; no new invocation was started");
    assert_eq!(job.state.invocation_id, running_id, "the running invocation is untouched by the overrun");
    assert!(
        h.queue.queued_for(&job_id("abc/1")).iter().any(|task| matches!(task.payload, ActionPayload::TickLater { .. })),
        "the schedule keeps re-arming through an overrun"
    );

    // `RecordOverrun` is itself a queued action, delivered a second after
    // the tick that emitted it; executing it is what actually writes the
    // OVERRUN row.
    h.advance(Duration::from_secs(1));
    let record_overrun = h
        .drain_due()
        .into_iter()
        .find(|task| matches!(task.payload, ActionPayload::RecordOverrun { .. }))
        .expect("the busy tick must have queued a RecordOverrun action");
    h.engine.execute_serialized_action(record_overrun.payload, record_overrun.retry_count).await.unwrap();

    let page = h.engine.list_invocations(&job_id("abc/1"), 10, None).await.unwrap();
    let overrun = page.items.iter().find(|inv| inv.status == InvocationStatus::Overrun).expect("an OVERRUN row must exist");
    assert_eq!(overrun.started_ms, overrun.finished_ms.unwrap());
    assert!(overrun.debug_log.contains(&running_id.to_string()));

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Running, "recording the overrun does not touch the running invocation");
}

/// §4.6: an inbound notification, once authenticated, is routed to the
/// backend and finalizes the invocation.
#[tokio::test]
async fn notification_finalizes_invocation() {
    let h = Harness::new();
    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "manual")]).await.unwrap();
    h.engine.trigger_invocation(&job_id("abc/1"), "user:who").await.unwrap();
    let start = h.queue.queued_for(&job_id("abc/1")).into_iter().next().unwrap();
    h.engine.execute_serialized_action(start.payload, start.retry_count).await.unwrap();

    let job = h.job("abc/1").await;
    let invocation_id = job.state.invocation_id;
    assert!(!invocation_id.is_zero());

    // Mint a token the same way `TaskController::prepare_topic` would, with
    // the same secret the harness wired the Engine with.
    let signer = crond_engine::TokenSigner::new(b"spec-harness-secret".to_vec());
    let token = signer.mint(&job_id("abc/1"), invocation_id, h.epoch_t()).unwrap();

    let msg = crond_backends::NotificationMessage {
        attributes: [("auth_token".to_string(), token)].into_iter().collect(),
        data: b"{\"ok\":true}".to_vec(),
        message_id: "msg-1".to_string(),
    };
    h.engine.process_notification(msg).await.unwrap();

    let inv = h.engine.get_invocation(&job_id("abc/1"), invocation_id).await.unwrap();
    assert_eq!(inv.status, InvocationStatus::Succeeded, "FakeTaskBackend's handle_notification completes successfully");

    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Suspended, "a manual job's post-done state is SUSPENDED");
    assert!(job.state.invocation_id.is_zero());

    // Re-delivery of the same (now-final) message is a silent no-op, not an
    // error: the dispatcher acknowledges and drops it.
    let signer2 = crond_engine::TokenSigner::new(b"spec-harness-secret".to_vec());
    let token2 = signer2.mint(&job_id("abc/1"), invocation_id, h.epoch_t()).unwrap();
    let redelivered = crond_backends::NotificationMessage {
        attributes: [("auth_token".to_string(), token2)].into_iter().collect(),
        data: Vec::new(),
        message_id: "msg-2".to_string(),
    };
    h.engine.process_notification(redelivered).await.unwrap();
}

/// A bad or missing `auth_token` is rejected as a permanent error — no
/// amount of redelivery will fix it.
#[tokio::test]
async fn notification_with_bad_token_is_rejected_permanently() {
    let h = Harness::new();
    let msg = crond_backends::NotificationMessage {
        attributes: [("auth_token".to_string(), "garbage".to_string())].into_iter().collect(),
        data: Vec::new(),
        message_id: "msg-1".to_string(),
    };
    let err = h.engine.process_notification(msg).await.unwrap_err();
    assert!(!err.is_transient());
}

/// A `JobStore` wrapper whose `put_job_cas` fails transiently a fixed number
/// of times before delegating, for exercising the Engine's transaction
/// retry loop (§5) without a real contended backing store.
struct FlakyStore {
    inner: MemoryJobStore,
    remaining_failures: std::sync::atomic::AtomicUsize,
}

impl FlakyStore {
    fn new(inner: MemoryJobStore, failures: usize) -> Self {
        Self { inner, remaining_failures: std::sync::atomic::AtomicUsize::new(failures) }
    }
}

#[async_trait::async_trait]
impl crond_store::JobStore for FlakyStore {
    async fn get_job(&self, id: &crond_core::JobId) -> Result<Option<(Job, u64)>, crond_store::StoreError> {
        self.inner.get_job(id).await
    }

    async fn put_job_cas(&self, job: &Job, expected_version: Option<u64>) -> Result<u64, crond_store::StoreError> {
        if self.remaining_failures.fetch_update(std::sync::atomic::Ordering::SeqCst, std::sync::atomic::Ordering::SeqCst, |n| {
            if n == 0 { None } else { Some(n - 1) }
        }).is_ok() {
            return Err(crond_store::StoreError::Io("simulated contention".into()));
        }
        self.inner.put_job_cas(job, expected_version).await
    }

    async fn list_enabled_jobs_by_project(&self, project: &str) -> Result<Vec<Job>, crond_store::StoreError> {
        self.inner.list_enabled_jobs_by_project(project).await
    }

    async fn list_all_enabled_jobs(&self) -> Result<Vec<Job>, crond_store::StoreError> {
        self.inner.list_all_enabled_jobs().await
    }

    async fn list_projects(&self) -> Result<Vec<String>, crond_store::StoreError> {
        self.inner.list_projects().await
    }

    async fn get_invocation(
        &self,
        job: &crond_core::JobId,
        id: InvocationId,
    ) -> Result<Option<crond_core::Invocation>, crond_store::StoreError> {
        self.inner.get_invocation(job, id).await
    }

    async fn invocation_exists(&self, job: &crond_core::JobId, id: InvocationId) -> Result<bool, crond_store::StoreError> {
        self.inner.invocation_exists(job, id).await
    }

    async fn put_invocation(&self, invocation: &crond_core::Invocation) -> Result<(), crond_store::StoreError> {
        self.inner.put_invocation(invocation).await
    }

    async fn put_invocation_cas(
        &self,
        invocation: &crond_core::Invocation,
        expected_current_mutations_count: u64,
    ) -> Result<(), crond_store::StoreError> {
        self.inner.put_invocation_cas(invocation, expected_current_mutations_count).await
    }

    async fn list_invocations(
        &self,
        job: &crond_core::JobId,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<crond_store::InvocationPage, crond_store::StoreError> {
        self.inner.list_invocations(job, page_size, cursor).await
    }

    async fn get_invocations_by_nonce(&self, job: &crond_core::JobId, nonce: u64) -> Result<Vec<crond_core::Invocation>, crond_store::StoreError> {
        self.inner.get_invocations_by_nonce(job, nonce).await
    }
}

fn flaky_engine(failures: usize) -> (Engine<FlakyStore, MemoryActionQueue, FakeClock>, MemoryJobStore) {
    let backing = MemoryJobStore::new();
    let store = FlakyStore::new(backing.clone(), failures);
    let queue = MemoryActionQueue::new();
    let clock = FakeClock::new();
    let mut registry = crond_engine::BackendRegistry::new();
    registry.register(std::sync::Arc::new(FakeTaskBackend::new(BACKEND)));
    let engine =
        Engine::new(store, queue, clock, registry, b"spec-harness-secret".to_vec(), "specs", "cron");
    (engine, backing)
}

/// S7: a store that fails its first few commit attempts before succeeding is
/// retried transparently up to the attempt budget; one that fails all 10
/// attempts surfaces a transient error and leaves no partial job row behind.
#[tokio::test]
async fn s7_transaction_retries_up_to_budget_then_surfaces_transient_error() {
    let (engine, _backing) = flaky_engine(3);
    let def = JobDefinition {
        id: job_id("abc/1"),
        schedule: "*/5 * * * * * *".to_string(),
        backend: BACKEND.to_string(),
        payload: b"{}".to_vec(),
        revision: "rev1".to_string(),
        revision_url: String::new(),
    };
    let summary = engine.update_project_jobs("abc", vec![def]).await.unwrap();
    assert_eq!(summary, UpdateSummary { updated: 1, unchanged: 0, disabled: 0 });

    let (engine, backing) = flaky_engine(crond_engine::MAX_TXN_ATTEMPTS as usize);
    let def = JobDefinition {
        id: job_id("abc/2"),
        schedule: "*/5 * * * * * *".to_string(),
        backend: BACKEND.to_string(),
        payload: b"{}".to_vec(),
        revision: "rev1".to_string(),
        revision_url: String::new(),
    };
    let err = engine.update_project_jobs("abc", vec![def]).await.unwrap_err();
    assert!(err.is_transient());
    assert!(backing.get_job(&job_id("abc/2")).await.unwrap().is_none(), "no partial row survives an exhausted retry budget");
}

/// S8: a job disabled while paused, then reintroduced via
/// `UpdateProjectJobs`, comes back with `paused=true` still set and its
/// effective schedule still `"manual"` until explicitly resumed.
#[tokio::test]
async fn s8_reenable_after_disable_inherits_paused() {
    let h = Harness::new();
    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();
    h.engine.pause_job(&job_id("abc/1"), "user:who").await.unwrap();
    let job = h.job("abc/1").await;
    assert!(job.paused);
    assert_eq!(job.effective_schedule(), "manual");

    h.engine.update_project_jobs("abc", vec![]).await.unwrap();
    let job = h.job("abc/1").await;
    assert_eq!(job.state.state, JobStateTag::Disabled);
    assert!(job.paused, "disabling must not clear paused");

    h.engine.update_project_jobs("abc", vec![h.def("abc/1", "*/5 * * * * * *")]).await.unwrap();
    let job = h.job("abc/1").await;
    assert!(job.enabled);
    assert!(job.paused, "re-enabling inherits the paused flag rather than resetting it");
    assert_eq!(job.effective_schedule(), "manual");
    assert_eq!(job.state.state, JobStateTag::Suspended, "a re-enabled but still-paused job lands SUSPENDED, not SCHEDULED");
}
