// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of pluggable `TaskBackend`s, keyed by the payload type tag
//! carried in each task's envelope (`task_envelope::TaskEnvelope::backend`).

use crate::error::EngineError;
use crond_backends::TaskBackend;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn TaskBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn TaskBackend>) -> &mut Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn TaskBackend>, EngineError> {
        self.backends.get(name).cloned().ok_or_else(|| EngineError::NoBackendForPayload(name.to_string()))
    }
}
