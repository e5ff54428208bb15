// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transactional Engine façade (§4.3): the only entry point the CLI and
//! the queue workers call. Everything else in this crate exists to serve
//! one of the methods below.

use crate::controller::EngineController;
use crate::error::EngineError;
use crate::id_gen;
use crate::registry::BackendRegistry;
use crate::task_envelope::TaskEnvelope;
use crate::token::TokenSigner;
use crate::topic::{IdentityResolver, NoopIdentityResolver, TopicCache};
use crond_backends::{ActionQueue, NotificationMessage, QueueName, QueuedTask, TaskController};
use crond_core::{
    apply_event, fnv64_seed, Action, ActionPayload, Clock, Event, Invocation, InvocationId, Job,
    JobId, NonceSource, Schedule,
};
use crond_store::{InvocationPage, JobStore};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Read-mutate-CAS budget for a single job transaction (§5). Exhausting it
/// means another writer has been racing this job continuously; surfaced as
/// a transient error so the caller's own retry (queue redelivery, CLI retry)
/// gets another shot.
pub const MAX_TXN_ATTEMPTS: u32 = 10;

/// One project's declared desired state for a single job, as handed to
/// `Engine::update_project_jobs` by whatever pushes configuration (CLI,
/// CI job, config-sync daemon).
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub id: JobId,
    pub schedule: String,
    pub backend: String,
    pub payload: Vec<u8>,
    pub revision: String,
    pub revision_url: String,
}

/// How many of a project's job definitions actually produced a mutation,
/// versus how many were already up to date.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct UpdateSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub disabled: usize,
}

struct Shared<S, Q, C> {
    store: S,
    queue: Q,
    clock: C,
    backends: BackendRegistry,
    token_signer: TokenSigner,
    topic_cache: TopicCache,
    identity_resolver: Arc<dyn IdentityResolver>,
}

/// The cron engine's transactional core. Cheap to clone — internally an
/// `Arc` over its store/queue/clock/backend registry — so queue workers and
/// CLI handlers can each hold their own handle.
pub struct Engine<S, Q, C> {
    shared: Arc<Shared<S, Q, C>>,
}

impl<S, Q, C> Clone for Engine<S, Q, C> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

fn fresh_rng() -> StdRng {
    StdRng::from_entropy()
}

/// Feeds the state machine nonces straight from a freshly seeded RNG. Owned
/// (not borrowed from a shared lock), so it's `Send` across whatever awaits
/// happen to straddle its use.
struct RngNonces {
    rng: StdRng,
}

impl RngNonces {
    fn new() -> Self {
        Self { rng: fresh_rng() }
    }
}

impl NonceSource for RngNonces {
    fn next_nonce(&mut self) -> u64 {
        loop {
            let n = self.rng.next_u64();
            if n != 0 {
                return n;
            }
        }
    }
}

impl<S, Q, C> Engine<S, Q, C>
where
    S: JobStore + 'static,
    Q: ActionQueue + 'static,
    C: Clock + 'static,
{
    pub fn new(
        store: S,
        queue: Q,
        clock: C,
        backends: BackendRegistry,
        token_secret: impl Into<Vec<u8>>,
        app: impl Into<String>,
        topic_prefix: &'static str,
    ) -> Self {
        Self::with_identity_resolver(
            store,
            queue,
            clock,
            backends,
            token_secret,
            app,
            topic_prefix,
            Arc::new(NoopIdentityResolver),
        )
    }

    pub fn with_identity_resolver(
        store: S,
        queue: Q,
        clock: C,
        backends: BackendRegistry,
        token_secret: impl Into<Vec<u8>>,
        app: impl Into<String>,
        topic_prefix: &'static str,
        identity_resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Engine {
            shared: Arc::new(Shared {
                store,
                queue,
                clock,
                backends,
                token_signer: TokenSigner::new(token_secret),
                topic_cache: TopicCache::new(app, topic_prefix),
                identity_resolver,
            }),
        }
    }

    /// The clock's current reading, for hosts driving their own sweep loop
    /// (`execute_serialized_action` on whatever a queue's `drain_due` yields).
    pub fn now_ms(&self) -> u64 {
        self.shared.clock.epoch_ms()
    }

    pub(crate) async fn put_invocation_cas(
        &self,
        invocation: &Invocation,
        expected_current_mutations_count: u64,
    ) -> Result<(), EngineError> {
        Ok(self.shared.store.put_invocation_cas(invocation, expected_current_mutations_count).await?)
    }

    fn resolve_schedule(job: &Job) -> Result<(Schedule, u64), EngineError> {
        let schedule = Schedule::parse(job.effective_schedule())?;
        Ok((schedule, fnv64_seed(job.id.as_str())))
    }

    async fn enqueue_actions(&self, job_id: &JobId, now_ms: u64, actions: Vec<Action>) -> Result<(), EngineError> {
        if actions.is_empty() {
            return Ok(());
        }
        for action in &actions {
            info!(job_id = %job_id, action = action.name(), fields = ?action.fields(), "emitting action");
        }
        let tasks: Vec<QueuedTask> = actions
            .iter()
            .map(|action| {
                let payload = ActionPayload::from_action(job_id.as_str(), action);
                match action {
                    Action::TickLater { when_ms, .. } => {
                        QueuedTask { queue: QueueName::Timer, payload, not_before_ms: *when_ms, retry_count: 0 }
                    }
                    Action::StartInvocation { .. } | Action::RecordOverrun { .. } => QueuedTask {
                        queue: QueueName::Invocations,
                        payload,
                        not_before_ms: now_ms + 1_000,
                        retry_count: 0,
                    },
                }
            })
            .collect();
        self.shared.queue.enqueue_all(tasks).await?;
        Ok(())
    }

    // ---- §4.3 UpdateProjectJobs ----------------------------------------

    #[instrument(skip(self, defs), fields(project = %project, count = defs.len()))]
    pub async fn update_project_jobs(
        &self,
        project: &str,
        defs: Vec<JobDefinition>,
    ) -> Result<UpdateSummary, EngineError> {
        let wanted_ids: HashSet<JobId> = defs.iter().map(|d| d.id.clone()).collect();
        let existing = self.shared.store.list_enabled_jobs_by_project(project).await?;
        let to_disable: Vec<JobId> =
            existing.into_iter().map(|j| j.id).filter(|id| !wanted_ids.contains(id)).collect();

        let total = defs.len() + to_disable.len();
        let mut set = tokio::task::JoinSet::new();
        for def in defs {
            let engine = self.clone();
            set.spawn(async move { engine.ensure_job(def).await });
        }
        for id in to_disable {
            let engine = self.clone();
            set.spawn(async move { engine.disable_job(id).await.map(|_| EnsureOutcome::Disabled) });
        }

        let mut summary = UpdateSummary::default();
        let mut failed = 0usize;
        let mut transient = false;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(EnsureOutcome::Updated)) => summary.updated += 1,
                Ok(Ok(EnsureOutcome::Unchanged)) => summary.unchanged += 1,
                Ok(Ok(EnsureOutcome::Disabled)) => summary.disabled += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "sub-operation failed during project update");
                    transient |= e.is_transient();
                    failed += 1;
                }
                Err(join_err) => {
                    warn!(error = %join_err, "sub-operation task panicked or was cancelled");
                    transient = true;
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(EngineError::Aggregate { failed, total, transient });
        }
        info!(?summary, "project jobs synced");
        Ok(summary)
    }

    async fn ensure_job(&self, def: JobDefinition) -> Result<EnsureOutcome, EngineError> {
        let task_bytes = TaskEnvelope::new(def.backend.clone(), def.payload.clone()).encode();
        for attempt in 0..MAX_TXN_ATTEMPTS {
            let now_ms = self.now_ms();
            let (current, version) = match self.shared.store.get_job(&def.id).await? {
                Some((j, v)) => (Some(j), Some(v)),
                None => (None, None),
            };
            let was_disabled = current.as_ref().map(|j| !j.enabled).unwrap_or(true);
            let mut job = current.clone().unwrap_or_else(|| Job::new(def.id.clone(), def.schedule.clone(), task_bytes.clone()));

            let unchanged = current.is_some()
                && job.enabled
                && job.schedule == def.schedule
                && job.task == task_bytes
                && job.revision == def.revision
                && job.revision_url == def.revision_url;
            if unchanged {
                return Ok(EnsureOutcome::Unchanged);
            }

            job.enabled = true;
            job.schedule = def.schedule.clone();
            job.task = task_bytes.clone();
            job.revision = def.revision.clone();
            job.revision_url = def.revision_url.clone();

            let event = if was_disabled { Event::JobEnabled } else { Event::ScheduleChange };
            let (schedule, seed) = Self::resolve_schedule(&job)?;
            let mut nonces = RngNonces::new();
            let (new_state, actions) = apply_event(&job.state, now_ms, &schedule, seed, &mut nonces, &event);
            job.state = new_state;

            match self.shared.store.put_job_cas(&job, version).await {
                Ok(_) => {
                    self.enqueue_actions(&def.id, now_ms, actions).await?;
                    return Ok(EnsureOutcome::Updated);
                }
                Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::RetryBudgetExhausted(def.id.to_string()))
    }

    async fn disable_job(&self, id: JobId) -> Result<(), EngineError> {
        for attempt in 0..MAX_TXN_ATTEMPTS {
            let now_ms = self.now_ms();
            let (current, version) = match self.shared.store.get_job(&id).await? {
                Some((j, v)) => (j, v),
                None => return Ok(()),
            };
            let mut job = current;
            if !job.enabled {
                return Ok(());
            }
            job.enabled = false;
            let (schedule, seed) = Self::resolve_schedule(&job)?;
            let mut nonces = RngNonces::new();
            let (new_state, _actions) =
                apply_event(&job.state, now_ms, &schedule, seed, &mut nonces, &Event::JobDisabled);
            job.state = new_state;
            match self.shared.store.put_job_cas(&job, Some(version)).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::RetryBudgetExhausted(id.to_string()))
    }

    // ---- §4.3 TriggerInvocation / Pause / Resume / Abort ----------------

    #[instrument(skip(self), fields(job_id = %job_id, who = %who))]
    pub async fn trigger_invocation(&self, job_id: &JobId, who: &str) -> Result<u64, EngineError> {
        for attempt in 0..MAX_TXN_ATTEMPTS {
            let now_ms = self.now_ms();
            let (job_opt, version) = match self.shared.store.get_job(job_id).await? {
                Some((j, v)) => (Some(j), v),
                None => (None, 0),
            };
            let mut job = job_opt.ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
            if !job.enabled {
                return Err(EngineError::JobNotFound(job_id.to_string()));
            }
            let (schedule, seed) = Self::resolve_schedule(&job)?;
            let mut nonces = RngNonces::new();
            let (new_state, actions) = apply_event(
                &job.state,
                now_ms,
                &schedule,
                seed,
                &mut nonces,
                &Event::ManualInvocation { triggered_by: who.to_string() },
            );
            let nonce = new_state.invocation_nonce;
            job.state = new_state;
            match self.shared.store.put_job_cas(&job, Some(version)).await {
                Ok(_) => {
                    self.enqueue_actions(job_id, now_ms, actions).await?;
                    return Ok(nonce);
                }
                Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::RetryBudgetExhausted(job_id.to_string()))
    }

    async fn set_paused(&self, job_id: &JobId, paused: bool) -> Result<(), EngineError> {
        for attempt in 0..MAX_TXN_ATTEMPTS {
            let now_ms = self.now_ms();
            let (job_opt, version) = match self.shared.store.get_job(job_id).await? {
                Some((j, v)) => (Some(j), v),
                None => (None, 0),
            };
            let mut job = job_opt.ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
            if job.paused == paused {
                return Ok(());
            }
            job.paused = paused;
            let (schedule, seed) = Self::resolve_schedule(&job)?;
            let mut nonces = RngNonces::new();
            let (new_state, actions) =
                apply_event(&job.state, now_ms, &schedule, seed, &mut nonces, &Event::ScheduleChange);
            job.state = new_state;
            match self.shared.store.put_job_cas(&job, Some(version)).await {
                Ok(_) => {
                    self.enqueue_actions(job_id, now_ms, actions).await?;
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::RetryBudgetExhausted(job_id.to_string()))
    }

    #[instrument(skip(self), fields(job_id = %job_id, who = %who))]
    pub async fn pause_job(&self, job_id: &JobId, who: &str) -> Result<(), EngineError> {
        info!(who, "pausing job");
        self.set_paused(job_id, true).await
    }

    #[instrument(skip(self), fields(job_id = %job_id, who = %who))]
    pub async fn resume_job(&self, job_id: &JobId, who: &str) -> Result<(), EngineError> {
        info!(who, "resuming job");
        self.set_paused(job_id, false).await
    }

    #[instrument(skip(self), fields(job_id = %job_id, invocation_id = %invocation_id, who = %who))]
    pub async fn abort_invocation(
        &self,
        job_id: &JobId,
        invocation_id: InvocationId,
        who: &str,
    ) -> Result<(), EngineError> {
        let inv = self
            .shared
            .store
            .get_invocation(job_id, invocation_id)
            .await?
            .ok_or_else(|| EngineError::InvocationNotFound(job_id.to_string(), invocation_id.to_string()))?;
        if inv.status.is_final() {
            return Ok(());
        }
        let envelope = TaskEnvelope::decode(&inv.task)?;
        let backend = self.shared.backends.get(&envelope.backend)?;
        let mut ctl =
            EngineController::new(self.clone(), job_id.clone(), envelope.backend, envelope.payload, inv);
        // Best-effort: the local status change is authoritative regardless
        // of whether the backend's own abort call succeeds.
        let _ = backend.abort_task(&mut ctl).await;
        ctl.set_status(crond_core::InvocationStatus::Aborted);
        ctl.debug_log(&format!("Aborted by {who}"));
        ctl.save().await
    }

    // ---- §4.3 ExecuteSerializedAction dispatch --------------------------

    #[instrument(skip(self, payload))]
    pub async fn execute_serialized_action(
        &self,
        payload: ActionPayload,
        retry_count: u32,
    ) -> Result<(), EngineError> {
        match payload {
            ActionPayload::TickLater { job_id, tick_nonce } => {
                let id = parse_job_id(&job_id)?;
                self.timer_tick(&id, tick_nonce).await
            }
            ActionPayload::StartInvocation { job_id, invocation_nonce, triggered_by } => {
                let id = parse_job_id(&job_id)?;
                self.start_invocation(&id, invocation_nonce, &triggered_by, retry_count).await
            }
            ActionPayload::RecordOverrun { job_id, overruns, running_invocation_id } => {
                let id = parse_job_id(&job_id)?;
                self.record_overrun(&id, overruns, InvocationId(running_invocation_id)).await
            }
        }
    }

    async fn timer_tick(&self, job_id: &JobId, tick_nonce: u64) -> Result<(), EngineError> {
        for attempt in 0..MAX_TXN_ATTEMPTS {
            let now_ms = self.now_ms();
            let (job_opt, version) = match self.shared.store.get_job(job_id).await? {
                Some((j, v)) => (j, v),
                None => return Ok(()),
            };
            let mut job = job_opt;
            if !job.state.is_expecting_tick(tick_nonce) {
                return Ok(());
            }
            let (schedule, seed) = Self::resolve_schedule(&job)?;
            let mut nonces = RngNonces::new();
            let (new_state, actions) =
                apply_event(&job.state, now_ms, &schedule, seed, &mut nonces, &Event::TimerTick { nonce: tick_nonce });
            job.state = new_state;
            match self.shared.store.put_job_cas(&job, Some(version)).await {
                Ok(_) => {
                    self.enqueue_actions(job_id, now_ms, actions).await?;
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::RetryBudgetExhausted(job_id.to_string()))
    }

    async fn record_overrun(
        &self,
        job_id: &JobId,
        overruns: u32,
        running_invocation_id: InvocationId,
    ) -> Result<(), EngineError> {
        let now_ms = self.now_ms();
        let mut rng = fresh_rng();
        let id = id_gen::generate_invocation_id(&self.shared.store, job_id, now_ms, &mut rng).await?;
        let inv = Invocation::new_overrun(job_id.clone(), id, now_ms, overruns, running_invocation_id);
        self.shared.store.put_invocation(&inv).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id, invocation_nonce))]
    async fn start_invocation(
        &self,
        job_id: &JobId,
        invocation_nonce: u64,
        triggered_by: &str,
        retry_count: u32,
    ) -> Result<(), EngineError> {
        let mut minted: Option<Invocation> = None;
        for attempt in 0..MAX_TXN_ATTEMPTS {
            let now_ms = self.now_ms();
            let (job_opt, version) = match self.shared.store.get_job(job_id).await? {
                Some((j, v)) => (j, v),
                None => return Ok(()),
            };
            let mut job = job_opt;
            if !job.state.is_expecting_invocation(invocation_nonce) {
                return Ok(());
            }

            let mut rng = fresh_rng();
            let id = id_gen::generate_invocation_id(&self.shared.store, job_id, now_ms, &mut rng).await?;
            let inv = Invocation::new_starting(
                job_id.clone(),
                id,
                invocation_nonce,
                triggered_by,
                job.revision.clone(),
                job.revision_url.clone(),
                job.task.clone(),
                retry_count,
                now_ms,
            );

            let prior = if job.state.invocation_id.is_zero() {
                None
            } else {
                self.shared.store.get_invocation(job_id, job.state.invocation_id).await?
            };

            let (schedule, seed) = Self::resolve_schedule(&job)?;
            let mut nonces = RngNonces::new();
            let (new_state, _actions) = apply_event(
                &job.state,
                now_ms,
                &schedule,
                seed,
                &mut nonces,
                &Event::InvocationStarting { nonce: invocation_nonce, invocation_id: id },
            );
            job.state = new_state;

            match self.shared.store.put_job_cas(&job, Some(version)).await {
                Ok(_) => {
                    self.shared.store.put_invocation(&inv).await?;
                    if let Some(mut old) = prior {
                        if !old.status.is_final() {
                            old.status = crond_core::InvocationStatus::Failed;
                            old.finished_ms = Some(now_ms);
                            old.append_debug_log(now_ms, &format!("superseded by invocation {id}"));
                            old.mutations_count += 1;
                            self.shared.store.put_invocation(&old).await?;
                        }
                    }
                    minted = Some(inv);
                    break;
                }
                Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e.into()),
            }
        }
        let inv = match minted {
            Some(inv) => inv,
            None => return Err(EngineError::RetryBudgetExhausted(job_id.to_string())),
        };

        let envelope = TaskEnvelope::decode(&inv.task)?;
        let backend = self.shared.backends.get(&envelope.backend)?;
        let mut ctl =
            EngineController::new(self.clone(), job_id.clone(), envelope.backend, envelope.payload, inv);
        ctl.debug_log(&format!("Invocation initiated (attempt {})", retry_count + 1));

        let launch_result = backend.launch_task(&mut ctl).await;
        let mut retry_requested = false;
        if let Err(e) = launch_result {
            retry_requested = e.is_transient();
            ctl.debug_log(&format!("Launch failed: {e}"));
            if retry_requested {
                ctl.debug_log("It will probably be retried");
            }
        }
        if ctl.status() == crond_core::InvocationStatus::Starting {
            ctl.set_status(crond_core::InvocationStatus::Failed);
        }
        if retry_requested {
            ctl.suppress_job_update();
        }
        ctl.save().await?;

        if retry_requested {
            return Err(EngineError::Backend(crond_backends::BackendError::Transient(
                "invocation launch failed transiently".into(),
            )));
        }
        Ok(())
    }

    /// §4.4 step 6: after a controller's `save()` writes the invocation,
    /// drive whatever job-level transition the status change implies. A
    /// no-op if the job no longer considers `invocation_id` current.
    pub(crate) async fn apply_invocation_transition(
        &self,
        job_id: &JobId,
        invocation_id: InvocationId,
        was_starting: bool,
        saving: &Invocation,
    ) -> Result<(), EngineError> {
        for attempt in 0..MAX_TXN_ATTEMPTS {
            let now_ms = self.now_ms();
            let (job_opt, version) = match self.shared.store.get_job(job_id).await? {
                Some((j, v)) => (j, v),
                None => return Ok(()),
            };
            let mut job = job_opt;
            if job.state.invocation_id != invocation_id {
                return Ok(());
            }
            let (schedule, seed) = Self::resolve_schedule(&job)?;
            let mut nonces = RngNonces::new();
            let mut actions = Vec::new();

            if was_starting && (saving.status == crond_core::InvocationStatus::Running || saving.status.is_final()) {
                let (s1, a1) = apply_event(
                    &job.state,
                    now_ms,
                    &schedule,
                    seed,
                    &mut nonces,
                    &Event::InvocationStarted { invocation_id },
                );
                job.state = s1;
                actions.extend(a1);
            }
            if saving.status.is_final() {
                let (s2, a2) =
                    apply_event(&job.state, now_ms, &schedule, seed, &mut nonces, &Event::InvocationDone { invocation_id });
                job.state = s2;
                actions.extend(a2);
            }

            match self.shared.store.put_job_cas(&job, Some(version)).await {
                Ok(_) => {
                    self.enqueue_actions(job_id, now_ms, actions).await?;
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                Err(e) if e.is_transient() => break,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::RetryBudgetExhausted(job_id.to_string()))
    }

    // ---- §4.6 notification plumbing -------------------------------------

    pub(crate) async fn prepare_topic(
        &self,
        job_id: &JobId,
        invocation_id: InvocationId,
        backend_name: &str,
        publisher: &str,
    ) -> Result<(String, String), EngineError> {
        let topic = self.shared.topic_cache.topic_name(backend_name, publisher);
        if let Some(stripped) = publisher.strip_prefix("https://") {
            let resolver = self.shared.identity_resolver.clone();
            let publisher_owned = stripped.to_string();
            self.shared
                .topic_cache
                .do_if_not_done(backend_name, publisher, move || async move {
                    resolver.resolve(&publisher_owned).await.map_err(EngineError::IdentityResolution)
                })
                .await?;
        } else {
            self.shared
                .topic_cache
                .do_if_not_done(backend_name, publisher, || async { Ok::<(), EngineError>(()) })
                .await?;
        }
        let now_ms = self.now_ms();
        let token = self.shared.token_signer.mint(job_id, invocation_id, now_ms)?;
        Ok((topic, token))
    }

    #[instrument(skip(self, msg), fields(message_id = %msg.message_id))]
    pub async fn process_notification(&self, msg: NotificationMessage) -> Result<(), EngineError> {
        let now_ms = self.now_ms();
        let token = msg
            .auth_token()
            .ok_or_else(|| EngineError::Token(crate::token::TokenError::Malformed("missing auth_token".into())))?;
        let (job_id, invocation_id) = self.shared.token_signer.validate(token, now_ms)?;
        let inv = self
            .shared
            .store
            .get_invocation(&job_id, invocation_id)
            .await?
            .ok_or_else(|| EngineError::InvocationNotFound(job_id.to_string(), invocation_id.to_string()))?;
        if inv.status.is_final() {
            return Ok(());
        }
        let envelope = TaskEnvelope::decode(&inv.task)?;
        let backend = self.shared.backends.get(&envelope.backend)?;
        let mut ctl =
            EngineController::new(self.clone(), job_id, envelope.backend, envelope.payload, inv);

        let result = backend.handle_notification(&mut ctl, &msg).await;
        let mut transient_err = None;
        if let Err(e) = result {
            if e.is_transient() {
                transient_err = Some(e);
            } else {
                if ctl.status() != crond_core::InvocationStatus::Failed {
                    ctl.set_status(crond_core::InvocationStatus::Failed);
                }
                ctl.debug_log(&format!("Notification handling failed: {e}"));
            }
        }
        ctl.save().await?;
        if let Some(e) = transient_err {
            return Err(EngineError::Backend(e));
        }
        Ok(())
    }

    /// Pull one message from `puller`, dispatch it, and ack/nack according
    /// to outcome. Returns `false` when the subscription had nothing
    /// pending. A transient processing error nacks for redelivery and is
    /// still returned to the caller; a permanent one acks (no amount of
    /// redelivery will fix it) and is also returned.
    pub async fn pull_notification(
        &self,
        puller: &dyn crate::notification::NotificationPuller,
    ) -> Result<bool, EngineError> {
        let msg = match puller.pull().await? {
            Some(msg) => msg,
            None => return Ok(false),
        };
        let message_id = msg.message_id.clone();
        match self.process_notification(msg).await {
            Ok(()) => {
                puller.ack(&message_id).await?;
                Ok(true)
            }
            Err(e) if e.is_transient() => {
                puller.nack(&message_id).await?;
                Err(e)
            }
            Err(e) => {
                puller.ack(&message_id).await?;
                Err(e)
            }
        }
    }

    // ---- §4.3 read-only queries ------------------------------------------

    pub async fn get_all_projects(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.shared.store.list_projects().await?)
    }

    pub async fn get_all_cron_jobs(&self) -> Result<Vec<Job>, EngineError> {
        Ok(self.shared.store.list_all_enabled_jobs().await?)
    }

    pub async fn get_project_cron_jobs(&self, project: &str) -> Result<Vec<Job>, EngineError> {
        Ok(self.shared.store.list_enabled_jobs_by_project(project).await?)
    }

    pub async fn get_cron_job(&self, job_id: &JobId) -> Result<Job, EngineError> {
        self.shared
            .store
            .get_job(job_id)
            .await?
            .map(|(j, _)| j)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))
    }

    pub async fn list_invocations(
        &self,
        job_id: &JobId,
        page_size: u32,
        cursor: Option<String>,
    ) -> Result<InvocationPage, EngineError> {
        Ok(self.shared.store.list_invocations(job_id, page_size.min(500), cursor).await?)
    }

    pub async fn get_invocation(&self, job_id: &JobId, id: InvocationId) -> Result<Invocation, EngineError> {
        self.shared
            .store
            .get_invocation(job_id, id)
            .await?
            .ok_or_else(|| EngineError::InvocationNotFound(job_id.to_string(), id.to_string()))
    }

    pub async fn get_invocations_by_nonce(&self, job_id: &JobId, nonce: u64) -> Result<Vec<Invocation>, EngineError> {
        Ok(self.shared.store.get_invocations_by_nonce(job_id, nonce).await?)
    }

    /// Dev-server convenience: re-derive every enabled job's tick arming as
    /// if freshly enabled, regardless of its current state. Never exposed
    /// in a production CLI surface.
    pub async fn reset_all_jobs_on_dev_server(&self) -> Result<(), EngineError> {
        let jobs = self.shared.store.list_all_enabled_jobs().await?;
        for job in jobs {
            let id = job.id.clone();
            let mut settled = false;
            for attempt in 0..MAX_TXN_ATTEMPTS {
                let now_ms = self.now_ms();
                let (job_opt, version) = match self.shared.store.get_job(&id).await? {
                    Some((j, v)) => (j, v),
                    None => {
                        settled = true;
                        break;
                    }
                };
                let mut job = job_opt;
                let (schedule, seed) = Self::resolve_schedule(&job)?;
                let mut nonces = RngNonces::new();
                let (new_state, actions) =
                    apply_event(&crond_core::JobState::disabled(), now_ms, &schedule, seed, &mut nonces, &Event::JobEnabled);
                job.state = new_state;
                match self.shared.store.put_job_cas(&job, Some(version)).await {
                    Ok(_) => {
                        self.enqueue_actions(&id, now_ms, actions).await?;
                        settled = true;
                        break;
                    }
                    Err(e) if e.is_transient() && attempt + 1 < MAX_TXN_ATTEMPTS => continue,
                    Err(e) if e.is_transient() => break,
                    Err(e) => return Err(e.into()),
                }
            }
            if !settled {
                return Err(EngineError::RetryBudgetExhausted(id.to_string()));
            }
        }
        Ok(())
    }
}

enum EnsureOutcome {
    Updated,
    Unchanged,
    Disabled,
}

fn parse_job_id(raw: &str) -> Result<JobId, EngineError> {
    JobId::parse(raw).map_err(|e| EngineError::InvalidActionPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crond_backends::{FakeTaskBackend, LaunchOutcome, MemoryActionQueue};
    use crond_core::test_support::job_id;
    use crond_core::{FakeClock, InvocationStatus, JobStateTag};
    use crond_store::MemoryJobStore;

    type TestEngine = Engine<MemoryJobStore, MemoryActionQueue, FakeClock>;

    fn harness(backend: FakeTaskBackend) -> (TestEngine, MemoryActionQueue, FakeClock) {
        let store = MemoryJobStore::new();
        let queue = MemoryActionQueue::new();
        let clock = FakeClock::new();
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(backend));
        let engine = Engine::new(
            store,
            queue.clone(),
            clock.clone(),
            registry,
            b"test-secret".to_vec(),
            "testapp",
            "cron",
        );
        (engine, queue, clock)
    }

    fn def(id: &str, schedule: &str) -> JobDefinition {
        JobDefinition {
            id: job_id(id),
            schedule: schedule.to_string(),
            backend: "fake".to_string(),
            payload: vec![1, 2, 3],
            revision: "rev1".to_string(),
            revision_url: String::new(),
        }
    }

    #[tokio::test]
    async fn update_project_jobs_is_idempotent() {
        let (engine, queue, _clock) = harness(FakeTaskBackend::new("fake"));

        let first = engine.update_project_jobs("proj", vec![def("proj/a", "*/5 * * * * * *")]).await.unwrap();
        assert_eq!(first.updated, 1);
        assert_eq!(queue.len(), 1);

        let second = engine.update_project_jobs("proj", vec![def("proj/a", "*/5 * * * * * *")]).await.unwrap();
        assert_eq!(second, UpdateSummary { updated: 0, unchanged: 1, disabled: 0 });
        assert_eq!(queue.len(), 1, "re-syncing an unchanged def must not queue a second tick");
    }

    #[tokio::test]
    async fn update_project_jobs_disables_jobs_dropped_from_the_wanted_set() {
        let (engine, _queue, _clock) = harness(FakeTaskBackend::new("fake"));

        engine.update_project_jobs("proj", vec![def("proj/a", "manual")]).await.unwrap();
        let summary = engine.update_project_jobs("proj", vec![]).await.unwrap();
        assert_eq!(summary, UpdateSummary { updated: 0, unchanged: 0, disabled: 1 });

        let job = engine.get_cron_job(&job_id("proj/a")).await.unwrap();
        assert!(!job.enabled);
    }

    #[tokio::test]
    async fn trigger_invocation_queues_a_start_invocation_task() {
        let (engine, queue, _clock) = harness(FakeTaskBackend::new("fake"));
        engine.update_project_jobs("proj", vec![def("proj/a", "manual")]).await.unwrap();
        assert!(queue.is_empty(), "a manual schedule arms no timer tick");

        let nonce = engine.trigger_invocation(&job_id("proj/a"), "user:alice").await.unwrap();
        assert_ne!(nonce, 0);

        let due = queue.drain_due(u64::MAX);
        assert_eq!(due.len(), 1);
        assert!(matches!(due[0].payload, ActionPayload::StartInvocation { .. }));
    }

    #[tokio::test]
    async fn full_cycle_from_tick_to_succeeded_invocation() {
        let backend = FakeTaskBackend::new("fake");
        backend.push_launch_outcome(LaunchOutcome::Succeeded);
        let (engine, queue, clock) = harness(backend);

        engine.update_project_jobs("proj", vec![def("proj/a", "*/5 * * * * * *")]).await.unwrap();
        let tick = queue.drain_due(u64::MAX).remove(0);
        clock.advance(std::time::Duration::from_secs(10));
        engine.execute_serialized_action(tick.payload, tick.retry_count).await.unwrap();

        let start = queue
            .drain_due(u64::MAX)
            .into_iter()
            .find(|t| matches!(t.payload, ActionPayload::StartInvocation { .. }))
            .expect("timer tick must queue a start-invocation task");
        engine.execute_serialized_action(start.payload, start.retry_count).await.unwrap();

        let job = engine.get_cron_job(&job_id("proj/a")).await.unwrap();
        assert_eq!(job.state.state, JobStateTag::Scheduled);
        assert!(job.state.invocation_id.is_zero(), "a synchronously-succeeded invocation leaves no running id behind");
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_through_suspended() {
        let (engine, _queue, _clock) = harness(FakeTaskBackend::new("fake"));
        engine.update_project_jobs("proj", vec![def("proj/a", "*/5 * * * * * *")]).await.unwrap();

        engine.pause_job(&job_id("proj/a"), "user:alice").await.unwrap();
        let paused = engine.get_cron_job(&job_id("proj/a")).await.unwrap();
        assert!(paused.paused);
        assert_eq!(paused.state.state, JobStateTag::Suspended);

        engine.resume_job(&job_id("proj/a"), "user:alice").await.unwrap();
        let resumed = engine.get_cron_job(&job_id("proj/a")).await.unwrap();
        assert!(!resumed.paused);
        assert_eq!(resumed.state.state, JobStateTag::Scheduled);
    }

    #[tokio::test]
    async fn abort_invocation_marks_it_aborted_and_is_idempotent() {
        let (engine, queue, _clock) = harness(FakeTaskBackend::new("fake"));
        engine.update_project_jobs("proj", vec![def("proj/a", "manual")]).await.unwrap();
        engine.trigger_invocation(&job_id("proj/a"), "user:alice").await.unwrap();
        let start = queue.drain_due(u64::MAX).remove(0);
        engine.execute_serialized_action(start.payload, start.retry_count).await.unwrap();

        let job = engine.get_cron_job(&job_id("proj/a")).await.unwrap();
        let invocation_id = job.state.invocation_id;
        assert!(!invocation_id.is_zero());

        engine.abort_invocation(&job_id("proj/a"), invocation_id, "user:alice").await.unwrap();
        let inv = engine.get_invocation(&job_id("proj/a"), invocation_id).await.unwrap();
        assert_eq!(inv.status, InvocationStatus::Aborted);

        // Already-final invocations are a no-op, not an error, on a second abort.
        engine.abort_invocation(&job_id("proj/a"), invocation_id, "user:alice").await.unwrap();
    }

    #[tokio::test]
    async fn process_notification_rejects_an_invalid_token() {
        let (engine, _queue, _clock) = harness(FakeTaskBackend::new("fake"));
        let msg = crond_backends::NotificationMessage {
            attributes: [("auth_token".to_string(), "not-a-real-token".to_string())].into_iter().collect(),
            data: Vec::new(),
            message_id: "m1".to_string(),
        };
        let err = engine.process_notification(msg).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
