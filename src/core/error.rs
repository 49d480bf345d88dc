use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors for a report run. Anything in here aborts the run with exit 1.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("No sessions directory could be resolved: {0}")]
    Configuration(String),
    #[error("Sessions directory not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Another usage-monitor run is in progress (lock held at {})", .0.display())]
    LockContention(PathBuf),
}

impl MonitorError {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// True when the failure means "busy" rather than "broken".
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::LockContention(_))
    }
}

/// A session file that could not be parsed. Collected, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}
