// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pure job state machine: `(JobState, Event) -> (JobState, Vec<Action>)`.
//! No I/O; the engine is responsible for everything this module touches by
//! reference (the clock, the nonce source, persistence).

use crate::action::Action;
use crate::id::InvocationId;
use crate::job::{JobState, JobStateTag};
use crate::schedule::Schedule;

/// Events the engine feeds into the state machine. Each carries whatever
/// nonce/ID the emitting layer already has in hand so staleness can be
/// detected without a second read.
#[derive(Debug, Clone)]
pub enum Event {
    JobEnabled,
    JobDisabled,
    ScheduleChange,
    TimerTick { nonce: u64 },
    ManualInvocation { triggered_by: String },
    InvocationStarting { nonce: u64, invocation_id: InvocationId },
    InvocationStarted { invocation_id: InvocationId },
    InvocationDone { invocation_id: InvocationId },
}

/// Supplies fresh nonces to the state machine. Implementations must never
/// return zero — zero is reserved to mean "no nonce armed".
pub trait NonceSource {
    fn next_nonce(&mut self) -> u64;
}

impl<F: FnMut() -> u64> NonceSource for F {
    fn next_nonce(&mut self) -> u64 {
        let n = self();
        debug_assert_ne!(n, 0, "NonceSource must not yield zero");
        n
    }
}

fn arm_tick(state: &mut JobState, schedule: &Schedule, seed: u64, now_ms: u64, nonces: &mut dyn NonceSource) -> Option<Action> {
    let anchor = state.tick_time_ms.unwrap_or(now_ms);
    match schedule.next(anchor.max(now_ms.saturating_sub(1)), seed) {
        Some(when_ms) => {
            let nonce = nonces.next_nonce();
            state.tick_nonce = nonce;
            state.tick_time_ms = Some(when_ms);
            Some(Action::TickLater { when_ms, tick_nonce: nonce })
        }
        None => {
            state.tick_nonce = 0;
            state.tick_time_ms = None;
            None
        }
    }
}

/// Apply `event` to `state`, returning the new state and any actions the
/// engine must now execute. `schedule`/`seed` reflect the job's *effective*
/// schedule (the caller already resolved `paused` to `"manual"`).
pub fn apply(
    state: &JobState,
    now_ms: u64,
    schedule: &Schedule,
    seed: u64,
    nonces: &mut dyn NonceSource,
    event: &Event,
) -> (JobState, Vec<Action>) {
    let mut next = state.clone();
    let mut actions = Vec::new();

    match event {
        Event::JobDisabled => {
            next = JobState::disabled();
            return (next, actions);
        }
        Event::JobEnabled => {
            if schedule.is_manual() {
                next.state = JobStateTag::Suspended;
                next.tick_nonce = 0;
                next.tick_time_ms = None;
            } else {
                next.state = JobStateTag::Scheduled;
                if let Some(a) = arm_tick(&mut next, schedule, seed, now_ms, nonces) {
                    actions.push(a);
                }
            }
        }
        Event::ScheduleChange => {
            if matches!(next.state, JobStateTag::Scheduled | JobStateTag::Suspended) {
                if schedule.is_manual() {
                    next.state = JobStateTag::Suspended;
                    next.tick_nonce = 0;
                    next.tick_time_ms = None;
                } else {
                    next.state = JobStateTag::Scheduled;
                    if let Some(a) = arm_tick(&mut next, schedule, seed, now_ms, nonces) {
                        actions.push(a);
                    }
                }
            }
            // Busy states (Queued/Running) pick up the schedule change when
            // the in-flight invocation finishes; Disabled ignores it.
        }
        Event::TimerTick { nonce } => {
            if !next.is_expecting_tick(*nonce) {
                // Stale retry or duplicate delivery; drop silently.
                return (next, actions);
            }
            if next.is_busy() {
                next.prev_time_ms = next.tick_time_ms;
                if let Some(a) = arm_tick(&mut next, schedule, seed, now_ms, nonces) {
                    actions.push(a);
                }
                actions.push(Action::RecordOverrun {
                    overruns: 1,
                    running_invocation_id: next.invocation_id,
                });
            } else {
                let invocation_nonce = nonces.next_nonce();
                next.invocation_nonce = invocation_nonce;
                next.invocation_time_ms = Some(now_ms);
                next.state = JobStateTag::Queued;
                actions.push(Action::StartInvocation {
                    invocation_nonce,
                    triggered_by: "cron".to_string(),
                });
                next.prev_time_ms = next.tick_time_ms;
                if let Some(a) = arm_tick(&mut next, schedule, seed, now_ms, nonces) {
                    actions.push(a);
                }
            }
        }
        Event::ManualInvocation { triggered_by } => {
            if !next.is_busy() {
                let invocation_nonce = nonces.next_nonce();
                next.invocation_nonce = invocation_nonce;
                next.invocation_time_ms = Some(now_ms);
                next.state = JobStateTag::Queued;
                actions.push(Action::StartInvocation {
                    invocation_nonce,
                    triggered_by: triggered_by.clone(),
                });
            }
        }
        Event::InvocationStarting { nonce, invocation_id } => {
            if next.state == JobStateTag::Queued && next.is_expecting_invocation(*nonce) {
                next.invocation_id = *invocation_id;
            }
        }
        Event::InvocationStarted { invocation_id } => {
            if next.state == JobStateTag::Queued && next.invocation_id == *invocation_id {
                next.state = JobStateTag::Running;
            }
        }
        Event::InvocationDone { invocation_id } => {
            if next.invocation_id == *invocation_id {
                next.invocation_id = InvocationId::ZERO;
                next.invocation_nonce = 0;
                next.invocation_time_ms = None;
                if schedule.is_manual() {
                    next.state = JobStateTag::Suspended;
                    next.tick_nonce = 0;
                    next.tick_time_ms = None;
                } else {
                    next.state = JobStateTag::Scheduled;
                    if next.tick_time_ms.is_none() {
                        if let Some(a) = arm_tick(&mut next, schedule, seed, now_ms, nonces) {
                            actions.push(a);
                        }
                    }
                }
            }
        }
    }

    (next, actions)
}
