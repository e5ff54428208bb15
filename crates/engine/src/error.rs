// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Engine's error taxonomy (§7): per-component errors composed via
//! `#[from]` into `EngineError`, with an `is_transient()` classifier so
//! callers branch on the taxonomy rather than matching variants.

use crate::notification::PullError;
use crate::task_envelope::EnvelopeError;
use crate::token::TokenError;
use crond_backends::{BackendError, QueueError};
use crond_core::ScheduleError;
use crond_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("invocation {1} not found under job {0}")]
    InvocationNotFound(String, String),

    #[error("invocation {1} under job {0} is already in a final state")]
    AlreadyFinal(String, String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Pull(#[from] PullError),

    #[error("no backend registered for task payload (tag {0:?})")]
    NoBackendForPayload(String),

    #[error("job transaction for {0} did not converge after the retry budget")]
    RetryBudgetExhausted(String),

    #[error("could not allocate an invocation id for {0} after the retry budget")]
    IdGenerationExhausted(String),

    /// A queued action payload did not decode into anything this engine
    /// emits. The engine only ever enqueues what it itself serialized, so
    /// this indicates a version skew or a corrupted queue row; callers
    /// should surface it loudly rather than retry it away.
    #[error("malformed action payload: {0}")]
    InvalidActionPayload(String),

    #[error("identity resolution failed: {0}")]
    IdentityResolution(String),

    #[error("{failed} of {total} sub-operations failed")]
    Aggregate { failed: usize, total: usize, transient: bool },
}

impl EngineError {
    /// Whether the surrounding queue task (or caller) should retry. Mirrors
    /// §7's taxonomy: datastore contention, update conflicts, queue-add
    /// failures, and backend-flagged transient errors are transient; bad
    /// input, missing entities, and already-final invocations are not.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Store(e) => e.is_transient(),
            EngineError::Queue(_) => true,
            EngineError::Backend(e) => e.is_transient(),
            EngineError::RetryBudgetExhausted(_) => true,
            EngineError::IdGenerationExhausted(_) => true,
            EngineError::IdentityResolution(_) => true,
            EngineError::Aggregate { transient, .. } => *transient,
            EngineError::JobNotFound(_)
            | EngineError::InvocationNotFound(..)
            | EngineError::AlreadyFinal(..)
            | EngineError::Schedule(_)
            | EngineError::Token(_)
            | EngineError::Envelope(_)
            | EngineError::NoBackendForPayload(_)
            | EngineError::InvalidActionPayload(_)
            | EngineError::Pull(_) => false,
        }
    }
}
