// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-(backend, publisher) topic naming and the `doIfNotDone` idempotency
//! cache (§4.6): topic provisioning and, for webhook-style publishers,
//! service-account resolution are amortized so repeated invocations of the
//! same job don't re-provision on every launch.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

/// Expiry for the process-local "done" cache. A shared KV cache with the
/// same TTL sits behind this in a real deployment (§4.7); this in-process
/// layer is purely a performance amortization, never a correctness
/// dependency — re-running the guarded work must stay safe.
const DONE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolves a service-account identity for a webhook-style (`https://`)
/// publisher before a topic is provisioned for it, mirroring the
/// push-subscription authorization model. The default resolver is a no-op,
/// appropriate when no such identity layer is wired in.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, publisher: &str) -> Result<(), String>;
}

pub struct NoopIdentityResolver;

#[async_trait]
impl IdentityResolver for NoopIdentityResolver {
    async fn resolve(&self, _publisher: &str) -> Result<(), String> {
        Ok(())
    }
}

fn sanitize_publisher(publisher: &str) -> String {
    publisher.replace('@', "~")
}

/// Builds topic names and amortizes per-(backend, publisher) provisioning.
pub struct TopicCache {
    app: String,
    prefix: &'static str,
    done: Mutex<HashMap<(String, String), Instant>>,
}

impl TopicCache {
    /// `prefix` is `"cron"` in production, a distinct value (e.g.
    /// `"dev-cron"`) in development to avoid cross-environment collisions.
    pub fn new(app: impl Into<String>, prefix: &'static str) -> Self {
        Self { app: app.into(), prefix, done: Mutex::new(HashMap::new()) }
    }

    /// `projects/<app>/topics/<prefix>+<backendName>+<sanitizedPublisher>`.
    pub fn topic_name(&self, backend: &str, publisher: &str) -> String {
        format!("projects/{}/topics/{}+{}+{}", self.app, self.prefix, backend, sanitize_publisher(publisher))
    }

    /// Run `work` for `(backend, publisher)` unless it already ran within
    /// the last 24 hours. Guarded by a mutex; correctness depends only on
    /// `work` being idempotent, not on this cache actually firing once.
    pub async fn do_if_not_done<F, Fut, E>(&self, backend: &str, publisher: &str, work: F) -> Result<(), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let key = (backend.to_string(), publisher.to_string());
        {
            let done = self.done.lock();
            if let Some(at) = done.get(&key) {
                if at.elapsed() < DONE_TTL {
                    return Ok(());
                }
            }
        }
        work().await?;
        self.done.lock().insert(key, Instant::now());
        Ok(())
    }
}
