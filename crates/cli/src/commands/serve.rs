// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `crond serve` — the long-running process: bootstrap the configured
//! catalog, then run the timer sweep, the two queue workers, and the
//! notification pull loop until shutdown.
//!
//! The real push-notification transport and a persistent store/queue are
//! external collaborators (§4.7, §10.4); this reference loop drains the
//! in-memory `MemoryActionQueue` and polls a `MemoryNotificationPuller` that
//! nothing outside this process publishes to yet.

use crate::app::CrondEngine;
use crate::catalog::{discover_projects, load_project_catalog};
use crate::config::Config;
use crate::error::CliError;
use crond_engine::MemoryNotificationPuller;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SWEEP_INTERVAL: Duration = Duration::from_millis(500);
const NOTIFICATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub async fn serve(engine: CrondEngine, config: Config, queue: crond_backends::MemoryActionQueue) -> Result<(), CliError> {
    if let Some(catalog_path) = &config.catalog {
        bootstrap_catalog(&engine, catalog_path).await;
    }

    let puller = Arc::new(MemoryNotificationPuller::new());

    let mut tasks = tokio::task::JoinSet::new();
    tasks.spawn(timer_and_invocation_sweep(engine.clone(), queue));
    tasks.spawn(notification_loop(engine.clone(), puller));
    if let Some(catalog_path) = config.catalog.clone() {
        tasks.spawn(reload_on_sighup(engine.clone(), catalog_path));
    }

    info!(app = %config.app, bind = %config.notification_bind_addr, "crond serve started");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, draining in-flight work");
        }
        Some(res) = tasks.join_next() => {
            if let Err(e) = res {
                warn!(error = %e, "a background loop exited unexpectedly");
            }
        }
    }
    Ok(())
}

async fn bootstrap_catalog(engine: &CrondEngine, catalog_path: &std::path::Path) {
    let projects = match discover_projects(catalog_path) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "failed to discover catalog projects at startup");
            return;
        }
    };
    for (project, file) in projects {
        match load_project_catalog(&project, &file) {
            Ok(defs) => match engine.update_project_jobs(&project, defs).await {
                Ok(summary) => info!(project, ?summary, "catalog pushed"),
                Err(e) => warn!(project, error = %e, "failed to push catalog"),
            },
            Err(e) => warn!(project, error = %e, "failed to load catalog file"),
        }
    }
}

async fn timer_and_invocation_sweep(engine: CrondEngine, queue: crond_backends::MemoryActionQueue) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let now_ms = engine.now_ms();
        for task in queue.drain_due(now_ms) {
            let engine = engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.execute_serialized_action(task.payload, task.retry_count).await {
                    if e.is_transient() {
                        warn!(error = %e, "transient failure executing queued action, will not be retried by this reference queue");
                    } else {
                        warn!(error = %e, "queued action failed");
                    }
                }
            });
        }
    }
}

async fn notification_loop(engine: CrondEngine, puller: Arc<MemoryNotificationPuller>) {
    let mut interval = tokio::time::interval(NOTIFICATION_POLL_INTERVAL);
    loop {
        interval.tick().await;
        match engine.pull_notification(puller.as_ref()).await {
            Ok(true) => info!("processed one notification"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "notification processing failed"),
        }
    }
}

#[cfg(unix)]
async fn reload_on_sighup(engine: CrondEngine, catalog_path: std::path::PathBuf) {
    let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) else {
        return;
    };
    loop {
        signal.recv().await;
        info!("SIGHUP received, reloading catalog");
        bootstrap_catalog(&engine, &catalog_path).await;
    }
}

#[cfg(not(unix))]
async fn reload_on_sighup(_engine: CrondEngine, _catalog_path: std::path::PathBuf) {
    std::future::pending().await
}
