use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::formatter::parse_thousands;
use crate::core::models::comparison::{ComparisonOutcome, ComparisonResult};
use crate::core::report::sidecar::ReportSummary;
use crate::core::report::store;

/// Label of the total line in the rendered report. Kept stable for parsing.
pub const TOTAL_LINE_LABEL: &str = "Total billable tokens:";

/// Pull the billable total out of a rendered report's text.
pub fn parse_total_from_text(text: &str) -> Option<u64> {
    text.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(TOTAL_LINE_LABEL)?;
        parse_thousands(rest)
    })
}

/// The most recent report in `dir` other than `current`.
pub fn previous_report(dir: &Path, current: &Path) -> std::io::Result<Option<PathBuf>> {
    let reports = store::list_reports(dir)?;
    Ok(reports.into_iter().rev().find(|p| p.as_path() != current))
}

/// Billable total of a persisted report: sidecar first, rendered text as fallback.
pub fn previous_total(report: &Path) -> Result<u64> {
    let sidecar = store::sidecar_path(report);
    match ReportSummary::load(&sidecar) {
        Ok(summary) => return Ok(summary.total_billable_tokens),
        Err(e) => debug!("Sidecar unavailable ({:#}), parsing report text", e),
    }

    let text = std::fs::read_to_string(report)
        .map_err(|e| anyhow!("cannot read {}: {}", report.display(), e))?;
    parse_total_from_text(&text)
        .ok_or_else(|| anyhow!("no billable total found in {}", report.display()))
}

/// Compare `current_total` with the report written before `current`.
/// Never fails: problems become `ComparisonOutcome::Unavailable`.
pub fn compare_with_previous(
    dir: &Path,
    current: &Path,
    current_total: u64,
    threshold_pct: f64,
) -> ComparisonOutcome {
    let previous = match previous_report(dir, current) {
        Ok(Some(p)) => p,
        Ok(None) => return ComparisonOutcome::unavailable("no previous report"),
        Err(e) => {
            return ComparisonOutcome::unavailable(format!("cannot list reports: {}", e))
        }
    };

    let name = previous
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match previous_total(&previous) {
        Ok(previous_total) => ComparisonOutcome::Compared(ComparisonResult::compute(
            name,
            previous_total,
            current_total,
            threshold_pct,
        )),
        Err(e) => ComparisonOutcome::unavailable(format!("{:#}", e)),
    }
}
