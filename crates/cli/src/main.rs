// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `crond`: CLI and daemon entry point for the cron job engine (§10.5).

mod app;
mod catalog;
mod commands;
mod config;
mod error;
mod output;

use clap::{Parser, Subcommand};
use config::Config;
use error::CliError;
use output::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Build identifier embedded at compile time by `build.rs`.
const BUILD_GIT_HASH: &str = env!("BUILD_GIT_HASH");

#[derive(Parser)]
#[command(name = "crond", version, about = "Distributed cron job engine")]
struct Cli {
    /// Path to the TOML config file. Defaults to $CROND_CONFIG or the
    /// platform config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit machine-readable JSON instead of a text table.
    #[arg(long, global = true)]
    json: bool,

    /// Raise log verbosity one notch beyond RUST_LOG's default.
    #[arg(long, global = true)]
    verbose: bool,

    /// Identity recorded as the actor behind manual lifecycle operations.
    #[arg(long, global = true, default_value = "cli")]
    who: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine loop: catalog bootstrap, timer sweep, queue workers,
    /// notification pull loop.
    Serve,
    /// Fire a job's task immediately, outside its schedule.
    Trigger { job_id: String },
    /// Suspend a job's schedule; its effective schedule becomes "manual".
    Pause { job_id: String },
    /// Resume a paused job's configured schedule.
    Resume { job_id: String },
    /// Force an in-flight invocation to ABORTED.
    Abort { job_id: String, invocation_id: i64 },
    /// Push a project's catalog file, enabling/updating/disabling jobs to
    /// match it exactly.
    PushConfig { project: String, catalog_file: PathBuf },
    /// List jobs, optionally scoped to one project.
    ListJobs {
        #[arg(long)]
        project: Option<String>,
    },
    /// Show one job's full state.
    ShowJob { job_id: String },
    /// Page through a job's invocation history, most recent first.
    ListInvocations {
        job_id: String,
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long, default_value_t = 50)]
        page_size: u32,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "crond=debug,crond_engine=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let format = OutputFormat::from_flag(cli.json);
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(build = BUILD_GIT_HASH, "crond starting");
    let (engine, queue) = app::build_engine(&config);

    match cli.command {
        Command::Serve => commands::serve::serve(engine, config, queue).await,
        Command::Trigger { job_id } => commands::lifecycle::trigger(&engine, &job_id, &cli.who, format).await,
        Command::Pause { job_id } => commands::lifecycle::pause(&engine, &job_id, &cli.who, format).await,
        Command::Resume { job_id } => commands::lifecycle::resume(&engine, &job_id, &cli.who, format).await,
        Command::Abort { job_id, invocation_id } => {
            commands::lifecycle::abort(&engine, &job_id, invocation_id, &cli.who, format).await
        }
        Command::PushConfig { project, catalog_file } => {
            commands::push_config::push_config(&engine, &project, &catalog_file, format).await
        }
        Command::ListJobs { project } => commands::jobs::list_jobs(&engine, project.as_deref(), format).await,
        Command::ShowJob { job_id } => commands::jobs::show_job(&engine, &job_id, format).await,
        Command::ListInvocations { job_id, cursor, page_size } => {
            commands::jobs::list_invocations(&engine, &job_id, cursor, page_size, format).await
        }
    }
}
