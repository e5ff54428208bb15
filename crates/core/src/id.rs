// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers for jobs and invocations.
//!
//! `JobId` is an operator-chosen `"<project>/<name>"` string; `InvocationId`
//! is an engine-allocated 63-bit monotonic-descending integer that doubles
//! as a natural sort key ("most recent first" under plain numeric order).

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// Error returned when a candidate job ID does not have the required shape.
#[derive(Debug, Clone, thiserror::Error)]
#[error("job id {0:?} must have exactly one '/' separating project and name")]
pub struct InvalidJobId(pub String);

/// `"<project>/<name>"`, globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "SmolStr", into = "SmolStr")]
pub struct JobId(SmolStr);

impl JobId {
    /// Construct from `project` and `name`, joining with `/`. Neither part
    /// may be empty or contain `/`.
    pub fn new(project: impl AsRef<str>, name: impl AsRef<str>) -> Result<Self, InvalidJobId> {
        let (project, name) = (project.as_ref(), name.as_ref());
        let joined = format!("{project}/{name}");
        Self::parse(joined)
    }

    /// Parse an already-joined `"<project>/<name>"` string.
    pub fn parse(s: impl Into<SmolStr>) -> Result<Self, InvalidJobId> {
        let s = s.into();
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(n), None) if !p.is_empty() && !n.is_empty() => Ok(Self(s)),
            _ => Err(InvalidJobId(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn project(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.splitn(2, '/').nth(1).unwrap_or_default()
    }
}

impl TryFrom<SmolStr> for JobId {
    type Error = InvalidJobId;
    fn try_from(s: SmolStr) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<JobId> for SmolStr {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 63-bit monotonic-descending invocation identifier.
///
/// Layout, high to low: sign bit 0 (always, since this fits in `i64`'s
/// positive range); 42 bits of `max_timestamp_ms - now_ms`; 16 bits of
/// random noise; 4 reserved bits, always zero. Newer invocations therefore
/// sort numerically smaller than older ones under the same job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(pub i64);

impl InvocationId {
    /// Bits reserved for the inverted timestamp.
    const TIMESTAMP_BITS: u32 = 42;
    /// Bits reserved for the random suffix.
    const RANDOM_BITS: u32 = 16;
    /// Low bits always zero.
    const RESERVED_BITS: u32 = 4;
    /// `(1 << TIMESTAMP_BITS) - 1`: the largest representable inverted timestamp.
    const TIMESTAMP_MASK: i64 = (1i64 << Self::TIMESTAMP_BITS) - 1;
    const RANDOM_MASK: i64 = (1i64 << Self::RANDOM_BITS) - 1;

    pub const ZERO: InvocationId = InvocationId(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Build an ID from an epoch-millis timestamp and a 16-bit random suffix.
    /// `now_ms` is expected to be well within `TIMESTAMP_MASK`; values beyond
    /// it saturate rather than wrap, which only degrades sort order in the
    /// year-2100-plus regime this engine will not run in.
    pub fn build(now_ms: u64, random_suffix: u16) -> Self {
        let inverted = Self::TIMESTAMP_MASK - (now_ms as i64).min(Self::TIMESTAMP_MASK);
        let value = (inverted << (Self::RANDOM_BITS + Self::RESERVED_BITS))
            | ((random_suffix as i64 & Self::RANDOM_MASK) << Self::RESERVED_BITS);
        InvocationId(value)
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
