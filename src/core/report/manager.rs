//! Orchestrates one report run: read, aggregate, render, persist, prune, compare.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::AppConfig;
use crate::core::error::{MonitorError, ParseError};
use crate::core::models::comparison::ComparisonOutcome;
use crate::core::models::window::{LookbackWindow, UsageWindow};
use crate::core::report::compare::compare_with_previous;
use crate::core::report::lock::{LockOptions, ReportLock};
use crate::core::report::render::{render_report, RenderContext};
use crate::core::report::sidecar::ReportSummary;
use crate::core::report::store;
use crate::core::usage::aggregator::aggregate_window;
use crate::core::usage::scanner::read_sessions;
use crate::core::usage::source::{self, SessionSource, SourceCandidates, SESSIONS_DIR_ENV};

pub const REPORTS_DIR: &str = "reports";
pub const LOGS_DIR: &str = "logs";

/// Tunables for a run, usually derived from `AppConfig`.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub data_dir: PathBuf,
    pub config_sessions_dir: Option<PathBuf>,
    pub retention_days: u32,
    pub spike_threshold_pct: f64,
    pub lock: LockOptions,
}

impl ReportOptions {
    pub fn from_config(config: &AppConfig, data_dir_override: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir_override.unwrap_or_else(|| config.data_dir()),
            config_sessions_dir: config.paths.sessions_dir.clone(),
            retention_days: config.retention.max_age_days,
            spike_threshold_pct: config.comparison.spike_threshold_pct,
            lock: LockOptions {
                timeout: Duration::from_secs(config.lock.timeout_secs),
                stale_after: Duration::from_secs(config.lock.stale_after_secs),
            },
        }
    }

    /// Defaults rooted at `data_dir`.
    #[cfg(test)]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(&AppConfig::default(), Some(data_dir.into()))
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone)]
pub struct ReportHandle {
    pub report_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub latest_path: PathBuf,
    pub source: SessionSource,
    pub usage: UsageWindow,
    pub files_seen: usize,
    pub parse_errors: Vec<ParseError>,
    pub pruned: Vec<PathBuf>,
    pub comparison: ComparisonOutcome,
    pub generated_at: DateTime<Utc>,
    pub report_text: String,
}

impl ReportHandle {
    pub fn skipped_files(&self) -> usize {
        self.parse_errors.len()
    }
}

pub struct ReportManager {
    opts: ReportOptions,
}

impl ReportManager {
    pub fn new(opts: ReportOptions) -> Self {
        Self { opts }
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.opts.data_dir.join(REPORTS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.opts.data_dir.join(LOGS_DIR)
    }

    /// Resolve the sessions directory against the process environment.
    pub fn resolve_source(&self, explicit: Option<&Path>) -> Result<SessionSource, MonitorError> {
        let env_override = std::env::var(SESSIONS_DIR_ENV).ok();
        let home = dirs::home_dir();
        let cwd = std::env::current_dir().ok();
        source::resolve(&SourceCandidates {
            explicit,
            env_override: env_override.as_deref(),
            config_default: self.opts.config_sessions_dir.as_deref(),
            home: home.as_deref(),
            cwd: cwd.as_deref(),
        })
    }

    /// Generate a report over the last `days` days.
    pub fn generate_report(
        &self,
        days: i64,
        sessions_dir: Option<&Path>,
    ) -> Result<ReportHandle, MonitorError> {
        // Validate before touching the filesystem.
        LookbackWindow::new(days, Utc::now())?;
        let source = self.resolve_source(sessions_dir)?;
        self.generate_report_at(days, source, Utc::now())
    }

    /// Clock-injected variant of `generate_report` with an already resolved source.
    pub fn generate_report_at(
        &self,
        days: i64,
        source: SessionSource,
        now: DateTime<Utc>,
    ) -> Result<ReportHandle, MonitorError> {
        let window = LookbackWindow::new(days, now)?;
        info!(
            "Generating usage report for {} from {} ({})",
            window.describe(),
            source.path.display(),
            source.kind
        );

        let scan = read_sessions(&source.path, &window, now)?;
        if !scan.parse_errors.is_empty() {
            info!(
                "{} session file(s) skipped due to parse errors",
                scan.parse_errors.len()
            );
        }
        let usage = aggregate_window(&scan.records, window);
        let report_text = render_report(
            &usage,
            &RenderContext {
                generated_at: now,
                sessions_dir: &source.path,
                files_seen: scan.files_seen,
                skipped_files: scan.skipped_files(),
            },
        );
        let summary = ReportSummary::from_window(&usage, now, scan.skipped_files());

        let reports_dir = self.reports_dir();
        let lock = ReportLock::acquire(&reports_dir, self.opts.lock)?;
        debug!("Holding {}", lock.path().display());

        let (report_path, sidecar_path) = store::next_report_paths(&reports_dir, now);
        summary.write(&sidecar_path)?;
        if let Err(e) = store::atomic_write(&report_path, report_text.as_bytes()) {
            let _ = fs::remove_file(&sidecar_path);
            return Err(e);
        }
        info!("Report saved to {}", report_path.display());

        let latest_path = store::update_latest(&reports_dir, &report_path)?;
        debug!("{} -> {}", latest_path.display(), report_path.display());

        let pruned = store::sweep_retention(
            &reports_dir,
            self.opts.retention_days,
            now,
            &[report_path.as_path(), sidecar_path.as_path()],
        )?;
        if !pruned.is_empty() {
            info!(
                "Removed {} file(s) older than {} days",
                pruned.len(),
                self.opts.retention_days
            );
        }

        let comparison = compare_with_previous(
            &reports_dir,
            &report_path,
            usage.total_billable_tokens,
            self.opts.spike_threshold_pct,
        );
        match &comparison {
            ComparisonOutcome::Compared(c) if c.spike => warn!(
                "Usage spike: billable tokens {} vs {} ({}), above the {}% threshold",
                c.current_total,
                c.previous_total,
                c.change_label(),
                c.threshold_pct
            ),
            ComparisonOutcome::Compared(c) => info!(
                "Change since {}: {}",
                c.previous_report,
                c.change_label()
            ),
            ComparisonOutcome::Unavailable { reason } => {
                warn!("Comparison unavailable: {}", reason)
            }
        }

        Ok(ReportHandle {
            report_path,
            sidecar_path,
            latest_path,
            source,
            usage,
            files_seen: scan.files_seen,
            parse_errors: scan.parse_errors,
            pruned,
            comparison,
            generated_at: now,
            report_text,
        })
    }
}
