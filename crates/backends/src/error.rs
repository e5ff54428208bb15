// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors a pluggable `TaskBackend` raises from `LaunchTask`, `AbortTask`,
/// or `HandleNotification`. The backend itself decides transient vs.
/// permanent, per §7's "Backend errors" row.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Permanent(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
