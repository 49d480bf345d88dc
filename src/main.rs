mod cli;
mod core;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::config::AppConfig;
use crate::core::error::MonitorError;
use crate::core::report::manager::{ReportManager, ReportOptions};

const LOG_ENV: &str = "USAGE_MONITOR_LOG";

#[derive(Parser)]
#[command(name = "usage-monitor", about = "Token usage reports from assistant session logs", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Lookback window in days (default 7)
    #[arg(allow_negative_numbers = true)]
    days: Option<String>,

    /// Directory of session log files
    sessions_dir: Option<PathBuf>,

    /// Output format (text|json)
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Base directory for reports/ and logs/
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print a crontab line that runs the monitor daily
    Schedule {
        /// Hour of day (0-23)
        #[arg(long, default_value_t = 9)]
        hour: u8,
        /// Minute of hour (0-59)
        #[arg(long, default_value_t = 0)]
        minute: u8,
        /// Lookback window passed to each run
        #[arg(long)]
        days: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print the config file location
    Path,
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("usage_monitor=debug")
        } else {
            EnvFilter::new("usage_monitor=info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; using defaults", e);
            AppConfig::default()
        }
    };

    let output_opts = cli::output::OutputOptions {
        format: cli::output::OutputFormat::resolve(
            cli.json,
            cli.format.as_deref(),
            &config.settings.default_format,
        ),
        pretty: cli.pretty,
        use_color: cli::output::detect_color(!cli.no_color, &config.settings.color),
        verbose: cli.verbose,
    };

    let manager = ReportManager::new(ReportOptions::from_config(&config, cli.data_dir.clone()));

    match cli.command {
        None => cli::report_cmd::run(
            &manager,
            cli.days.as_deref(),
            config.settings.default_days,
            cli.sessions_dir.as_deref(),
            &output_opts,
        )?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init(&output_opts)?,
            ConfigAction::Check => cli::config_cmd::check(&output_opts)?,
            ConfigAction::Path => cli::config_cmd::path(&output_opts)?,
        },
        Some(Commands::Schedule { hour, minute, days }) => cli::schedule_cmd::run(
            &manager,
            hour,
            minute,
            days.unwrap_or(config.settings.default_days),
            &output_opts,
        )?,
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let busy = e
                .downcast_ref::<MonitorError>()
                .map(MonitorError::is_busy)
                .unwrap_or(false);
            error!("{:#}", e);
            if busy {
                eprintln!("busy: another usage-monitor run is in progress ({:#})", e);
            } else {
                eprintln!("error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
