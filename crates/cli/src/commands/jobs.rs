// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `crond list-jobs|show-job|list-invocations` — read-only queries against
//! the Engine.

use crate::app::CrondEngine;
use crate::error::CliError;
use crate::output::{column_width, print, OutputFormat};
use crond_core::{Invocation, Job, JobId};
use serde::Serialize;

pub async fn list_jobs(engine: &CrondEngine, project: Option<&str>, format: OutputFormat) -> Result<(), CliError> {
    let jobs = match project {
        Some(p) => engine.get_project_cron_jobs(p).await?,
        None => engine.get_all_cron_jobs().await?,
    };
    print(format, &jobs, |jobs| print_jobs_table(jobs))?;
    Ok(())
}

fn print_jobs_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs");
        return;
    }
    let id_w = column_width(jobs.iter().map(|j| j.id.as_str()), 8);
    println!("{:<id_w$}  {:<10}  {:<9}  {}", "JOB", "STATE", "SCHEDULE", "REVISION", id_w = id_w);
    for job in jobs {
        println!(
            "{:<id_w$}  {:<10}  {:<9}  {}",
            job.id.as_str(),
            job.state.state.to_string(),
            job.effective_schedule(),
            job.revision,
            id_w = id_w
        );
    }
}

pub async fn show_job(engine: &CrondEngine, job_id: &str, format: OutputFormat) -> Result<(), CliError> {
    let id = JobId::parse(job_id).map_err(|e| CliError::Usage(e.to_string()))?;
    let job = engine.get_cron_job(&id).await?;
    print(format, &job, |job| {
        println!("id:              {}", job.id);
        println!("enabled:         {}", job.enabled);
        println!("paused:          {}", job.paused);
        println!("schedule:        {}", job.schedule);
        println!("effective:       {}", job.effective_schedule());
        println!("revision:        {} ({})", job.revision, job.revision_url);
        println!("state:           {}", job.state.state);
        println!("invocation_id:   {}", job.state.invocation_id);
    })?;
    Ok(())
}

#[derive(Serialize)]
struct InvocationsPage {
    items: Vec<Invocation>,
    cursor: Option<String>,
}

pub async fn list_invocations(
    engine: &CrondEngine,
    job_id: &str,
    cursor: Option<String>,
    page_size: u32,
    format: OutputFormat,
) -> Result<(), CliError> {
    let id = JobId::parse(job_id).map_err(|e| CliError::Usage(e.to_string()))?;
    let page = engine.list_invocations(&id, page_size, cursor).await?;
    let page = InvocationsPage { items: page.items, cursor: page.cursor };
    print(format, &page, |page| {
        if page.items.is_empty() {
            println!("No invocations");
            return;
        }
        println!("{:<22}  {:<10}  {:<8}  {}", "INVOCATION", "STATUS", "RETRIES", "TRIGGERED_BY");
        for inv in &page.items {
            println!("{:<22}  {:<10}  {:<8}  {}", inv.id.to_string(), inv.status, inv.retry_count, inv.triggered_by);
        }
        if let Some(cursor) = &page.cursor {
            println!("\n--cursor {cursor} for more");
        }
    })?;
    Ok(())
}
