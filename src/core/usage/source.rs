use std::path::{Path, PathBuf};

use crate::core::error::MonitorError;

/// Environment override for the session log directory.
pub const SESSIONS_DIR_ENV: &str = "USAGE_MONITOR_SESSIONS_DIR";

/// Where the resolved sessions directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Argument,
    Environment,
    Config,
    AutoDetected,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Argument => write!(f, "argument"),
            Self::Environment => write!(f, "{}", SESSIONS_DIR_ENV),
            Self::Config => write!(f, "config"),
            Self::AutoDetected => write!(f, "auto-detected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSource {
    pub path: PathBuf,
    pub kind: SourceKind,
}

/// Inputs to the resolution chain, gathered by the caller.
#[derive(Debug, Clone, Default)]
pub struct SourceCandidates<'a> {
    pub explicit: Option<&'a Path>,
    pub env_override: Option<&'a str>,
    pub config_default: Option<&'a Path>,
    pub home: Option<&'a Path>,
    pub cwd: Option<&'a Path>,
}

/// Project directory name the assistant runtime uses for a working directory:
/// every path separator and dot becomes a dash.
///   "/home/me/.ai-store" -> "-home-me--ai-store"
pub fn encode_project_dir(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' | ':' => '-',
            other => other,
        })
        .collect()
}

/// `~/.claude/projects/<encoded cwd>`, the runtime's per-project log directory.
pub fn default_sessions_dir(home: &Path, cwd: &Path) -> PathBuf {
    home.join(".claude")
        .join("projects")
        .join(encode_project_dir(cwd))
}

fn expand_home(raw: &str, home: Option<&Path>) -> PathBuf {
    match (raw.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if raw == "~" => home.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(raw)),
        _ => PathBuf::from(raw),
    }
}

/// Resolve the sessions directory: explicit argument, then the environment
/// override, then the configured default, then the auto-detected project
/// directory. Existence is not checked here.
pub fn resolve(candidates: &SourceCandidates<'_>) -> Result<SessionSource, MonitorError> {
    if let Some(path) = candidates.explicit.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(SessionSource {
            path: path.to_path_buf(),
            kind: SourceKind::Argument,
        });
    }

    if let Some(raw) = candidates.env_override.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(SessionSource {
            path: expand_home(raw, candidates.home),
            kind: SourceKind::Environment,
        });
    }

    if let Some(path) = candidates
        .config_default
        .filter(|p| !p.as_os_str().is_empty())
    {
        return Ok(SessionSource {
            path: expand_home(&path.to_string_lossy(), candidates.home),
            kind: SourceKind::Config,
        });
    }

    match (candidates.home, candidates.cwd) {
        (Some(home), Some(cwd)) => Ok(SessionSource {
            path: default_sessions_dir(home, cwd),
            kind: SourceKind::AutoDetected,
        }),
        (None, _) => Err(MonitorError::Configuration(format!(
            "no sessions_dir argument, {} is unset, and the home directory is unknown",
            SESSIONS_DIR_ENV
        ))),
        (_, None) => Err(MonitorError::Configuration(format!(
            "no sessions_dir argument, {} is unset, and the working directory is unknown",
            SESSIONS_DIR_ENV
        ))),
    }
}
