use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{self, OutputFormat, OutputOptions};
use crate::core::report::manager::ReportManager;

pub const CRON_LOG_NAME: &str = "monitor-cron.log";

#[derive(Serialize)]
struct SchedulePayload<'a> {
    cron_line: String,
    log_path: &'a Path,
}

/// Crontab entry running a report daily at `hour:minute`, appending to the cron log.
pub fn cron_line(exe: &Path, hour: u8, minute: u8, days: i64, log: &Path) -> String {
    format!(
        "{} {} * * * {} {} >> {} 2>&1",
        minute,
        hour,
        shell_quote(&exe.to_string_lossy()),
        days,
        shell_quote(&log.to_string_lossy())
    )
}

fn shell_quote(raw: &str) -> String {
    if raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+:".contains(c))
    {
        raw.to_string()
    } else {
        format!("'{}'", raw.replace('\'', r"'\''"))
    }
}

pub fn run(
    manager: &ReportManager,
    hour: u8,
    minute: u8,
    days: i64,
    opts: &OutputOptions,
) -> Result<()> {
    if hour > 23 {
        bail!("hour must be between 0 and 23, got {}", hour);
    }
    if minute > 59 {
        bail!("minute must be between 0 and 59, got {}", minute);
    }
    if days <= 0 {
        bail!("days must be a positive integer, got {}", days);
    }

    let logs = manager.logs_dir();
    std::fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create {}", logs.display()))?;
    let exe = std::env::current_exe().context("Failed to locate the usage-monitor binary")?;

    let log_path = logs.join(CRON_LOG_NAME);
    let line = cron_line(&exe, hour, minute, days, &log_path);

    match opts.format {
        OutputFormat::Json => output::print_json(
            &SchedulePayload {
                cron_line: line,
                log_path: &log_path,
            },
            opts,
        ),
        OutputFormat::Text => {
            eprintln!("Add this line to your crontab (crontab -e):");
            println!("{}", line);
            Ok(())
        }
    }
}
