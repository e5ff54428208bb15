// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk job catalog: the TOML shape `push-config` reads and `serve`
//! bootstraps from. One file per project; a directory of files is a
//! multi-project catalog, the file stem naming the project.

use crond_engine::JobDefinition;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },

    #[error("failed to parse catalog file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },

    #[error("job id {project}/{name} is not a valid job id: {source}")]
    BadJobId { project: String, name: String, #[source] source: crond_core::InvalidJobId },
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default, rename = "job")]
    jobs: Vec<RawCatalogJob>,
}

#[derive(Debug, Deserialize)]
struct RawCatalogJob {
    name: String,
    schedule: String,
    backend: String,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    revision: String,
    #[serde(default)]
    revision_url: String,
}

/// Parse one project's catalog file into the `JobDefinition`s
/// `Engine::update_project_jobs` expects.
pub fn load_project_catalog(project: &str, path: &Path) -> Result<Vec<JobDefinition>, CatalogError> {
    let text =
        std::fs::read_to_string(path).map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
    let raw: RawCatalog =
        toml::from_str(&text).map_err(|source| CatalogError::Parse { path: path.to_path_buf(), source })?;

    raw.jobs
        .into_iter()
        .map(|job| {
            let id = crond_core::JobId::new(project, &job.name).map_err(|source| CatalogError::BadJobId {
                project: project.to_string(),
                name: job.name.clone(),
                source,
            })?;
            Ok(JobDefinition {
                id,
                schedule: job.schedule,
                backend: job.backend,
                payload: job.payload.into_bytes(),
                revision: job.revision,
                revision_url: job.revision_url,
            })
        })
        .collect()
}

/// Discover every project catalog under `path`: if `path` is a file, it is
/// the sole project (named by its file stem); if a directory, every `*.toml`
/// file directly inside it is one project.
pub fn discover_projects(path: &Path) -> Result<Vec<(String, PathBuf)>, CatalogError> {
    if path.is_dir() {
        let mut projects = Vec::new();
        let entries = std::fs::read_dir(path).map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
            let file = entry.path();
            if file.extension().and_then(|e| e.to_str()) == Some("toml") {
                if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                    projects.push((stem.to_string(), file));
                }
            }
        }
        projects.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(projects)
    } else {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("default").to_string();
        Ok(vec![(stem, path.to_path_buf())])
    }
}
