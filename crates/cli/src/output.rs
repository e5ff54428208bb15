// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared text/JSON output helpers, mirroring the source pack's CLI output
//! convention: one `OutputFormat` flag, JSON via `serde_json::to_string_pretty`,
//! hand-aligned columns for text.

use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Print a single serializable value as pretty JSON, or hand the value to
/// `text` for human-readable rendering.
pub fn print<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

pub fn column_width<'a, I: IntoIterator<Item = &'a str>>(items: I, min: usize) -> usize {
    items.into_iter().map(str::len).max().unwrap_or(0).max(min)
}
