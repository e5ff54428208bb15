// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `crond trigger|pause|resume|abort` — direct job/invocation lifecycle
//! operations, one Engine call each.

use crate::app::CrondEngine;
use crate::error::CliError;
use crate::output::{print, OutputFormat};
use crond_core::{InvocationId, JobId};
use serde::Serialize;

fn parse_job_id(raw: &str) -> Result<JobId, CliError> {
    JobId::parse(raw).map_err(|e| CliError::Usage(e.to_string()))
}

#[derive(Serialize)]
struct Triggered {
    job_id: String,
    invocation_nonce: u64,
}

pub async fn trigger(engine: &CrondEngine, job_id: &str, who: &str, format: OutputFormat) -> Result<(), CliError> {
    let id = parse_job_id(job_id)?;
    let nonce = engine.trigger_invocation(&id, who).await?;
    let result = Triggered { job_id: id.to_string(), invocation_nonce: nonce };
    print(format, &result, |r| println!("triggered {} (invocation_nonce={})", r.job_id, r.invocation_nonce))?;
    Ok(())
}

pub async fn pause(engine: &CrondEngine, job_id: &str, who: &str, format: OutputFormat) -> Result<(), CliError> {
    let id = parse_job_id(job_id)?;
    engine.pause_job(&id, who).await?;
    print(format, &serde_json::json!({"job_id": id.to_string(), "paused": true}), |_| {
        println!("paused {id}")
    })?;
    Ok(())
}

pub async fn resume(engine: &CrondEngine, job_id: &str, who: &str, format: OutputFormat) -> Result<(), CliError> {
    let id = parse_job_id(job_id)?;
    engine.resume_job(&id, who).await?;
    print(format, &serde_json::json!({"job_id": id.to_string(), "paused": false}), |_| {
        println!("resumed {id}")
    })?;
    Ok(())
}

pub async fn abort(
    engine: &CrondEngine,
    job_id: &str,
    invocation_id: i64,
    who: &str,
    format: OutputFormat,
) -> Result<(), CliError> {
    let id = parse_job_id(job_id)?;
    let inv_id = InvocationId(invocation_id);
    engine.abort_invocation(&id, inv_id, who).await?;
    print(format, &serde_json::json!({"job_id": id.to_string(), "invocation_id": invocation_id}), |_| {
        println!("aborted {id} invocation {invocation_id}")
    })?;
    Ok(())
}
