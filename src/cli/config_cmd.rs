use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{self, OutputFormat, OutputOptions};
use crate::core::config::AppConfig;

#[derive(Serialize)]
struct PathPayload<'a> {
    path: &'a Path,
    exists: bool,
}

#[derive(Serialize)]
struct InitPayload<'a> {
    path: &'a Path,
    created: bool,
}

#[derive(Serialize)]
struct CheckPayload<'a> {
    path: &'a Path,
    exists: bool,
    valid: bool,
    issues: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    data_dir: Option<PathBuf>,
}

pub fn init(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        if opts.format == OutputFormat::Json {
            return output::print_json(&InitPayload { path: &path, created: false }, opts);
        }
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    let path = AppConfig::default()
        .save()
        .context("Failed to generate config")?;
    match opts.format {
        OutputFormat::Json => output::print_json(&InitPayload { path: &path, created: true }, opts),
        OutputFormat::Text => {
            println!("Generated config at {}", path.display());
            Ok(())
        }
    }
}

pub fn path(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    match opts.format {
        OutputFormat::Json => output::print_json(
            &PathPayload {
                exists: path.exists(),
                path: &path,
            },
            opts,
        ),
        OutputFormat::Text => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

pub fn check(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    if !path.exists() {
        if opts.format == OutputFormat::Json {
            let payload = CheckPayload {
                path: &path,
                exists: false,
                valid: true,
                issues: &[],
                data_dir: None,
            };
            return output::print_json(&payload, opts);
        }
        eprintln!("No config file found at {}", path.display());
        eprintln!("Run `usage-monitor config init` to create one.");
        return Ok(());
    }

    let config = AppConfig::load().context("Failed to load config")?;
    let issues = config.validate();

    if opts.format == OutputFormat::Json {
        let payload = CheckPayload {
            path: &path,
            exists: true,
            valid: issues.is_empty(),
            issues: &issues,
            data_dir: Some(config.data_dir()),
        };
        output::print_json(&payload, opts)?;
    } else if issues.is_empty() {
        println!("Config is valid: {}", path.display());
        println!("  Data directory: {}", config.data_dir().display());
        if let Some(dir) = &config.paths.sessions_dir {
            println!("  Sessions directory: {}", dir.display());
        }
        println!(
            "  Retention: {} days, spike threshold: {}%",
            config.retention.max_age_days, config.comparison.spike_threshold_pct
        );
    } else {
        eprintln!("Config issues found in {}:", path.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} config issue(s)", issues.len())
    }
}
