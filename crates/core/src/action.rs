// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions emitted by the state machine: transient instructions the engine
//! must carry out (enqueue a timer, start an invocation, record an overrun).
//! Never persisted directly — see `action.rs`'s `ActionPayload` for the
//! opaque, queue-transported encoding.

use crate::id::InvocationId;
use serde::{Deserialize, Serialize};

/// A side effect emitted by the state machine. Not persisted; serialized to
/// an [`ActionPayload`] for queue transport by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Arm a timer that should fire `OnTimerTick(tick_nonce)` at `when`.
    TickLater { when_ms: u64, tick_nonce: u64 },
    /// Start a new invocation under `invocation_nonce`, attributing it to
    /// `triggered_by` (a scheduler tag or an operator identity).
    StartInvocation { invocation_nonce: u64, triggered_by: String },
    /// Record that a tick arrived while a prior invocation was still
    /// in-flight.
    RecordOverrun { overruns: u32, running_invocation_id: InvocationId },
}

impl Action {
    /// Action name for log spans and the serialized payload's `kind` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Action::TickLater { .. } => "tick_later",
            Action::StartInvocation { .. } => "start_invocation",
            Action::RecordOverrun { .. } => "record_overrun",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Action::TickLater { when_ms, tick_nonce } => {
                vec![("when_ms", when_ms.to_string()), ("tick_nonce", tick_nonce.to_string())]
            }
            Action::StartInvocation { invocation_nonce, triggered_by } => vec![
                ("invocation_nonce", invocation_nonce.to_string()),
                ("triggered_by", triggered_by.clone()),
            ],
            Action::RecordOverrun { overruns, running_invocation_id } => vec![
                ("overruns", overruns.to_string()),
                ("running_invocation_id", running_invocation_id.to_string()),
            ],
        }
    }
}

/// The wire-level, queue-opaque encoding of an [`Action`] plus the job it
/// belongs to. This is what actually rides the timer/invocations queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ActionPayload {
    #[serde(rename = "TickLaterAction")]
    TickLater { job_id: String, tick_nonce: u64 },
    #[serde(rename = "StartInvocationAction")]
    StartInvocation { job_id: String, invocation_nonce: u64, triggered_by: String },
    #[serde(rename = "RecordOverrunAction")]
    RecordOverrun { job_id: String, overruns: u32, running_invocation_id: i64 },
}

impl ActionPayload {
    pub fn job_id_str(&self) -> &str {
        match self {
            ActionPayload::TickLater { job_id, .. }
            | ActionPayload::StartInvocation { job_id, .. }
            | ActionPayload::RecordOverrun { job_id, .. } => job_id,
        }
    }

    pub fn from_action(job_id: &str, action: &Action) -> Self {
        match action {
            Action::TickLater { tick_nonce, .. } => {
                ActionPayload::TickLater { job_id: job_id.to_string(), tick_nonce: *tick_nonce }
            }
            Action::StartInvocation { invocation_nonce, triggered_by } => {
                ActionPayload::StartInvocation {
                    job_id: job_id.to_string(),
                    invocation_nonce: *invocation_nonce,
                    triggered_by: triggered_by.clone(),
                }
            }
            Action::RecordOverrun { overruns, running_invocation_id } => {
                ActionPayload::RecordOverrun {
                    job_id: job_id.to_string(),
                    overruns: *overruns,
                    running_invocation_id: running_invocation_id.0,
                }
            }
        }
    }
}
