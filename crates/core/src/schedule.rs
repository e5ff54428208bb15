// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron expression parsing and per-job schedule dispersion.

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Sub-second jitter window used to disperse jobs sharing an expression.
/// Wide enough to separate colliding jobs, narrow enough to never affect
/// which second the expression matches.
const DISPERSION_WINDOW_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("bad schedule expression {0:?}: {1}")]
    BadExpression(String, String),
}

/// A parsed schedule: either a cron expression or the literal `"manual"`,
/// which never fires autonomously.
#[derive(Debug, Clone)]
pub enum Schedule {
    Manual,
    Cron(CronSchedule),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        if expr == "manual" {
            return Ok(Schedule::Manual);
        }
        CronSchedule::from_str(expr)
            .map(Schedule::Cron)
            .map_err(|e| ScheduleError::BadExpression(expr.to_string(), e.to_string()))
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Schedule::Manual)
    }

    /// Returns the next firing instant strictly after `after_ms`, dispersed
    /// by `seed` to avoid thundering-herd collisions between jobs sharing an
    /// identical expression. `None` for a manual schedule.
    pub fn next(&self, after_ms: u64, seed: u64) -> Option<u64> {
        let cron = match self {
            Schedule::Manual => return None,
            Schedule::Cron(c) => c,
        };
        let after = epoch_ms_to_datetime(after_ms);
        let next = cron.after(&after).next()?;
        let base_ms = datetime_to_epoch_ms(next);
        Some(base_ms + (seed % DISPERSION_WINDOW_MS))
    }
}

/// Stable 64-bit hash of a job ID, used to seed schedule dispersion so the
/// same job always disperses to the same offset. FNV-1a, not a security
/// hash — only needs to be stable and well-distributed.
pub fn fnv64_seed(job_id: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for byte in job_id.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn epoch_ms_to_datetime(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64).single().unwrap_or_else(|| {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Utc.timestamp_millis_opt(now.as_millis() as i64).single().unwrap_or_else(Utc::now)
    })
}

fn datetime_to_epoch_ms(dt: DateTime<Utc>) -> u64 {
    dt.timestamp_millis().max(0) as u64
}
