// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level CLI error, carrying the process exit code the way the source
//! pack's `ExitError` does, composed from each layer's own error type via
//! `#[from]`.

use crate::catalog::CatalogError;
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Engine(#[from] crond_engine::EngineError),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code: `1` for a usage/input mistake the operator should
    /// fix, `2` for a transient engine failure worth retrying, `3` for
    /// everything else (config, I/O, JSON encoding).
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 1,
            CliError::Engine(e) if e.is_transient() => 2,
            _ => 3,
        }
    }
}
