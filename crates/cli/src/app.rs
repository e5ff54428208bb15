// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wires a `Config` into a runnable `Engine`. This core ships only the
//! in-memory reference store/queue/clock (§10.4) and the trivial
//! `LogBackend` (§10.4); a production deployment substitutes its own
//! `JobStore`/`ActionQueue`/`TaskBackend` behind the same traits.

use crate::config::Config;
use crond_backends::{LogBackend, MemoryActionQueue};
use crond_core::SystemClock;
use crond_engine::{BackendRegistry, Engine};
use crond_store::MemoryJobStore;
use std::sync::Arc;

pub type CrondEngine = Engine<MemoryJobStore, MemoryActionQueue, SystemClock>;

/// Build an Engine plus a handle to its own action queue — `Engine` itself
/// has no accessor for the queue it was built with, since production
/// deployments drain it through the host's own task-queue transport rather
/// than polling it back out.
pub fn build_engine(config: &Config) -> (CrondEngine, MemoryActionQueue) {
    let mut backends = BackendRegistry::new();
    backends.register(Arc::new(LogBackend::new("log")));

    let queue = MemoryActionQueue::new();
    let engine = Engine::new(
        MemoryJobStore::new(),
        queue.clone(),
        SystemClock,
        backends,
        config.hmac_secret.clone(),
        config.app.clone(),
        config.topic_prefix,
    );
    (engine, queue)
}
