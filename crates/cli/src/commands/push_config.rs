// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `crond push-config <project> <catalog-file>` — the operator-facing
//! entry point for `Engine::update_project_jobs`.

use crate::app::CrondEngine;
use crate::catalog::load_project_catalog;
use crate::error::CliError;
use crate::output::{print, OutputFormat};
use std::path::Path;

pub async fn push_config(
    engine: &CrondEngine,
    project: &str,
    catalog_file: &Path,
    format: OutputFormat,
) -> Result<(), CliError> {
    let defs = load_project_catalog(project, catalog_file)?;
    let count = defs.len();
    let summary = engine.update_project_jobs(project, defs).await?;
    print(format, &summary, |s| {
        println!(
            "pushed {count} job(s) for {project}: {} updated, {} unchanged, {} disabled",
            s.updated, s.unchanged, s.disabled
        )
    })?;
    Ok(())
}
