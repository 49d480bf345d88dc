//! On-disk layout of the reports directory.
//!
//! Every file lands through a temp file + rename, so a reader never sees a
//! partially written report under its final name.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::core::error::MonitorError;

pub const REPORT_PREFIX: &str = "usage-";
pub const REPORT_EXT: &str = "txt";
pub const SIDECAR_EXT: &str = "json";
pub const LATEST_NAME: &str = "latest.txt";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TEMP_EXT: &str = "tmp";

/// `usage-2026-10-19_09-00-00.txt`
pub fn report_file_name(ts: DateTime<Utc>) -> String {
    format!(
        "{}{}.{}",
        REPORT_PREFIX,
        ts.format(TIMESTAMP_FORMAT),
        REPORT_EXT
    )
}

/// Timestamp encoded in a report or sidecar file name, if it is one.
pub fn parse_report_name(name: &str) -> Option<NaiveDateTime> {
    let stem = name
        .strip_suffix(&format!(".{}", REPORT_EXT))
        .or_else(|| name.strip_suffix(&format!(".{}", SIDECAR_EXT)))?;
    let ts = stem.strip_prefix(REPORT_PREFIX)?;
    NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()
}

fn is_report_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(REPORT_EXT)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_report_name)
            .is_some()
}

fn is_report_or_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_report_name)
        .is_some()
}

pub fn sidecar_path(report: &Path) -> PathBuf {
    report.with_extension(SIDECAR_EXT)
}

/// Text reports in `dir`, oldest first (names sort chronologically).
pub fn list_reports(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut reports: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_report_file(p))
        .collect();
    reports.sort();
    Ok(reports)
}

/// Report and sidecar paths for a new run. If a report for that second
/// already exists the timestamp is pushed forward until the name is free.
pub fn next_report_paths(dir: &Path, now: DateTime<Utc>) -> (PathBuf, PathBuf) {
    let mut ts = now;
    loop {
        let report = dir.join(report_file_name(ts));
        let sidecar = sidecar_path(&report);
        if !report.exists() && !sidecar.exists() {
            return (report, sidecar);
        }
        ts += Duration::seconds(1);
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}", name, TEMP_EXT))
}

/// Write `path` atomically, letting `fill` produce the contents.
pub fn atomic_write_with<F>(path: &Path, fill: F) -> Result<(), MonitorError>
where
    F: FnOnce(&mut fs::File) -> std::io::Result<()>,
{
    let temp_path = temp_path_for(path);
    let _ = fs::remove_file(&temp_path);

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        fill(&mut file)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(source) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(MonitorError::write(path, source));
    }
    Ok(())
}

pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), MonitorError> {
    atomic_write_with(path, |file| file.write_all(contents))
}

/// Point `latest.txt` at `report`, replacing any previous pointer in one rename.
pub fn update_latest(dir: &Path, report: &Path) -> Result<PathBuf, MonitorError> {
    let latest = dir.join(LATEST_NAME);
    let temp = temp_path_for(&latest);
    let _ = fs::remove_file(&temp);

    #[cfg(unix)]
    {
        let target = report.file_name().map(PathBuf::from).unwrap_or_else(|| report.to_path_buf());
        std::os::unix::fs::symlink(&target, &temp)
            .and_then(|_| fs::rename(&temp, &latest))
            .map_err(|source| {
                let _ = fs::remove_file(&temp);
                MonitorError::write(&latest, source)
            })?;
    }

    #[cfg(not(unix))]
    {
        let contents = fs::read(report).map_err(|source| MonitorError::write(&latest, source))?;
        atomic_write(&latest, &contents)?;
    }

    Ok(latest)
}

/// Resolve `latest.txt` to the report it points at.
#[cfg(test)]
pub fn resolve_latest(dir: &Path) -> Option<PathBuf> {
    let latest = dir.join(LATEST_NAME);
    let target = fs::read_link(&latest).ok()?;
    Some(if target.is_absolute() {
        target
    } else {
        dir.join(target)
    })
}

/// Delete reports and sidecars last modified more than `max_age_days` before
/// `now`, plus temp files left behind by interrupted writes. Paths in `keep`
/// are never touched. Returns what was removed.
pub fn sweep_retention(
    dir: &Path,
    max_age_days: u32,
    now: DateTime<Utc>,
    keep: &[&Path],
) -> Result<Vec<PathBuf>, MonitorError> {
    let cutoff: SystemTime = (now - Duration::days(max_age_days as i64)).into();
    let entries = fs::read_dir(dir).map_err(|source| MonitorError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut removed = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if keep.iter().any(|k| *k == path.as_path()) {
            continue;
        }

        let is_leftover_temp = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.') && n.ends_with(&format!(".{}", TEMP_EXT)))
            .unwrap_or(false);

        let expired = is_report_or_sidecar(&path)
            && entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|mtime| mtime < cutoff)
                .unwrap_or(false);

        if !(expired || is_leftover_temp) {
            continue;
        }

        fs::remove_file(&path).map_err(|source| MonitorError::write(&path, source))?;
        debug!("Removed {}", path.display());
        removed.push(path);
    }
    removed.sort();
    Ok(removed)
}
