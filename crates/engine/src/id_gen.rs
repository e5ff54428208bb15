// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! §4.5 InvocationIDGen: compute the inverted-timestamp portion once, then
//! try randomized 16-bit suffixes against the store until one is unused.

use crate::error::EngineError;
use crond_core::{InvocationId, JobId};
use crond_store::JobStore;
use rand::RngCore;

/// Collision probability at 16 random bits is negligible; this bounds the
/// pathological case rather than looping forever.
pub const MAX_ID_GEN_ATTEMPTS: u32 = 10;

pub async fn generate_invocation_id<S: JobStore>(
    store: &S,
    job_id: &JobId,
    now_ms: u64,
    rng: &mut dyn RngCore,
) -> Result<InvocationId, EngineError> {
    for _ in 0..MAX_ID_GEN_ATTEMPTS {
        let suffix = (rng.next_u32() & 0xFFFF) as u16;
        let candidate = InvocationId::build(now_ms, suffix);
        if !store.invocation_exists(job_id, candidate).await? {
            return Ok(candidate);
        }
    }
    Err(EngineError::IdGenerationExhausted(job_id.to_string()))
}
