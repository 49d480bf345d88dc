use serde::Serialize;
use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    /// `--json` wins, then `--format`, then the configured default.
    pub fn resolve(json_flag: bool, format: Option<&str>, config_default: &str) -> Self {
        if json_flag {
            return Self::Json;
        }
        match format.unwrap_or(config_default) {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

/// Whether terminal output should be colored.
///
/// `--no-color` and `NO_COLOR` always win; otherwise the configured mode
/// (`always`, `never`, `auto`) decides, with `auto` following stdout's TTY state.
pub fn detect_color(color_flag: bool, config_mode: &str) -> bool {
    if !color_flag {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match config_mode {
        "always" => true,
        "never" => false,
        _ => std::io::stdout().is_terminal(),
    }
}

/// Print `value` as JSON on stdout, pretty when asked.
pub fn print_json<T: Serialize>(value: &T, opts: &OutputOptions) -> anyhow::Result<()> {
    let json = if opts.pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}
