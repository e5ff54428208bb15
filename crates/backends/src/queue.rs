// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two-named-queue `ActionQueue` adapter (§6): one queue for timer
//! ticks (each task carries an `ETA`), one for invocation starts and
//! overrun records (each task carries a one-second post-commit `delay`).

use async_trait::async_trait;
use crond_core::{ActionPayload, JobId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to enqueue task: {0}")]
    EnqueueFailed(String),
}

/// Which of the two named queues a task was enqueued onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    Timer,
    Invocations,
}

/// A task as it sits on a queue: the opaque payload plus the earliest
/// instant (epoch ms) it should be delivered.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub queue: QueueName,
    pub payload: ActionPayload,
    pub not_before_ms: u64,
    pub retry_count: u32,
}

#[async_trait]
pub trait ActionQueue: Send + Sync {
    async fn enqueue(&self, task: QueuedTask) -> Result<(), QueueError>;

    /// Batch add, matching the source's `AddMulti`-per-queue fan-out.
    async fn enqueue_all(&self, tasks: Vec<QueuedTask>) -> Result<(), QueueError> {
        for task in tasks {
            self.enqueue(task).await?;
        }
        Ok(())
    }
}

/// In-memory reference `ActionQueue`. Delivery is driven by the caller
/// polling [`MemoryActionQueue::drain_due`] — there is no background
/// dispatch thread, matching this crate's "ship a reference implementation
/// behind the trait, not a production queue" scope.
#[derive(Clone, Default)]
pub struct MemoryActionQueue {
    tasks: std::sync::Arc<Mutex<VecDeque<QueuedTask>>>,
}

impl MemoryActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every task whose `not_before_ms` has elapsed as of
    /// `now_ms`, in the order they were enqueued.
    pub fn drain_due(&self, now_ms: u64) -> Vec<QueuedTask> {
        let mut tasks = self.tasks.lock();
        let mut due = Vec::new();
        let mut remaining = VecDeque::with_capacity(tasks.len());
        for task in tasks.drain(..) {
            if task.not_before_ms <= now_ms {
                due.push(task);
            } else {
                remaining.push_back(task);
            }
        }
        *tasks = remaining;
        due
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks currently queued for `job_id`, regardless of due time — used by
    /// tests asserting "zero queue adds" / "one timer task queued".
    pub fn queued_for(&self, job_id: &JobId) -> Vec<QueuedTask> {
        self.tasks.lock().iter().filter(|t| t.payload.job_id_str() == job_id.as_str()).cloned().collect()
    }
}

#[async_trait]
impl ActionQueue for MemoryActionQueue {
    async fn enqueue(&self, task: QueuedTask) -> Result<(), QueueError> {
        self.tasks.lock().push_back(task);
        Ok(())
    }
}
