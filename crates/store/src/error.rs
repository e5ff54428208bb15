// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transactional store's error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("invocation {1} not found under job {0}")]
    InvocationNotFound(String, String),

    /// Another writer committed a Job mutation first; the caller retries
    /// under a fresh read, up to its attempt budget.
    #[error("job {0} was concurrently modified")]
    JobConflict(String),

    /// The optimistic-concurrency failure from §4.4: `saving.mutationsCount
    /// != current.mutationsCount + 1`. Transient; the surrounding queue task
    /// retries.
    #[error("invocation {1} under job {0} failed its mutations-count check (update conflict)")]
    UpdateConflict(String, String),

    /// A simulated or real backing-store failure (network blip, contention
    /// timeout). Transient.
    #[error("store I/O error: {0}")]
    Io(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::JobConflict(_) | Self::UpdateConflict(..) | Self::Io(_))
    }
}
