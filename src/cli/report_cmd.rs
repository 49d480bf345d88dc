use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{self, OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::models::comparison::ComparisonOutcome;
use crate::core::models::window::{DailyTotals, LookbackWindow};
use crate::core::report::manager::{ReportHandle, ReportManager};

#[derive(Serialize)]
struct SkippedFile {
    path: PathBuf,
    reason: String,
}

#[derive(Serialize)]
struct RunPayload<'a> {
    report_path: &'a Path,
    sidecar_path: &'a Path,
    latest_path: &'a Path,
    sessions_dir: &'a Path,
    sessions_source: String,
    generated_at: DateTime<Utc>,
    days: u32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_billable_tokens: u64,
    total_input_tokens: u64,
    total_output_tokens: u64,
    sessions: usize,
    files_seen: usize,
    estimated_cost: f64,
    per_day: &'a [DailyTotals],
    skipped_files: Vec<SkippedFile>,
    pruned: usize,
    comparison: &'a ComparisonOutcome,
    spike: bool,
}

impl<'a> RunPayload<'a> {
    fn new(handle: &'a ReportHandle) -> Self {
        let usage = &handle.usage;
        Self {
            report_path: &handle.report_path,
            sidecar_path: &handle.sidecar_path,
            latest_path: &handle.latest_path,
            sessions_dir: &handle.source.path,
            sessions_source: handle.source.kind.to_string(),
            generated_at: handle.generated_at,
            days: usage.days(),
            start_date: usage.start_date(),
            end_date: usage.end_date(),
            total_billable_tokens: usage.total_billable_tokens,
            total_input_tokens: usage.total_input_tokens,
            total_output_tokens: usage.total_output_tokens,
            sessions: usage.sessions,
            files_seen: handle.files_seen,
            estimated_cost: usage.estimated_cost(),
            per_day: &usage.per_day,
            skipped_files: handle
                .parse_errors
                .iter()
                .map(|e| SkippedFile {
                    path: e.path.clone(),
                    reason: e.reason.clone(),
                })
                .collect(),
            pruned: handle.pruned.len(),
            comparison: &handle.comparison,
            spike: handle.comparison.is_spike(),
        }
    }
}

/// Run one report generation and print the result.
///
/// `days` is the raw CLI value; `None` falls back to `default_days`.
pub fn run(
    manager: &ReportManager,
    days: Option<&str>,
    default_days: i64,
    sessions_dir: Option<&Path>,
    opts: &OutputOptions,
) -> Result<()> {
    let days = match days {
        Some(raw) => LookbackWindow::parse_days(raw)?,
        None => default_days,
    };

    let handle = manager.generate_report(days, sessions_dir)?;

    match opts.format {
        OutputFormat::Text => {
            print!("{}", handle.report_text);
            println!();
            println!("{}", renderer::render_summary(&handle, opts.use_color));
        }
        OutputFormat::Json => {
            output::print_json(&RunPayload::new(&handle), opts)?;
        }
    }

    if opts.verbose {
        for err in &handle.parse_errors {
            eprintln!("Skipped {}", err);
        }
    }
    Ok(())
}
