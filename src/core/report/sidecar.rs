use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::error::MonitorError;
use crate::core::models::window::UsageWindow;
use crate::core::report::store;

const SIDECAR_VERSION: u32 = 1;

/// Machine-readable summary stored next to each text report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub days: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_billable_tokens: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub sessions: usize,
    pub skipped_files: usize,
}

impl ReportSummary {
    pub fn from_window(usage: &UsageWindow, generated_at: DateTime<Utc>, skipped_files: usize) -> Self {
        Self {
            version: SIDECAR_VERSION,
            generated_at,
            days: usage.days(),
            start_date: usage.start_date(),
            end_date: usage.end_date(),
            total_billable_tokens: usage.total_billable_tokens,
            total_input_tokens: usage.total_input_tokens,
            total_output_tokens: usage.total_output_tokens,
            sessions: usage.sessions,
            skipped_files,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), MonitorError> {
        let mut json = serde_json::to_string(self)
            .map_err(|e| MonitorError::write(path, std::io::Error::other(e)))?;
        json.push('\n');
        store::atomic_write(path, json.as_bytes())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sidecar {}", path.display()))?;
        let summary: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse sidecar {}", path.display()))?;
        if summary.version != SIDECAR_VERSION {
            bail!(
                "Unsupported sidecar version {} in {}",
                summary.version,
                path.display()
            );
        }
        Ok(summary)
    }
}
