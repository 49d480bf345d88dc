use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::core::error::MonitorError;

pub const LOCK_NAME: &str = ".usage-monitor.lock";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// How long to keep retrying before giving up.
    pub timeout: Duration,
    /// A lock older than this is treated as abandoned.
    pub stale_after: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            stale_after: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Advisory lock over a reports directory, released on drop.
#[derive(Debug)]
pub struct ReportLock {
    path: PathBuf,
    /// Exact contents written on acquisition; identifies this holder on disk.
    token: String,
}

impl ReportLock {
    /// Acquire the lock in `dir`, creating the directory if needed.
    pub fn acquire(dir: &Path, opts: LockOptions) -> Result<Self, MonitorError> {
        fs::create_dir_all(dir).map_err(|source| MonitorError::write(dir, source))?;
        let path = dir.join(LOCK_NAME);
        let deadline = Instant::now() + opts.timeout;

        loop {
            match try_create(&path) {
                Ok(token) => {
                    debug!("Acquired lock {}", path.display());
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some((observed, age)) = read_lock(&path) {
                        if age > opts.stale_after {
                            warn!(
                                "Reclaiming stale lock {} (held for {}s)",
                                path.display(),
                                age.as_secs()
                            );
                            if remove_if_unchanged(&path, &observed) {
                                continue;
                            }
                        }
                    }
                }
                Err(source) => return Err(MonitorError::write(&path, source)),
            }

            if Instant::now() >= deadline {
                return Err(MonitorError::LockContention(path));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ReportLock {
    fn drop(&mut self) {
        if !remove_if_unchanged(&self.path, self.token.as_bytes()) {
            warn!(
                "Lock {} was taken over by another run; leaving it in place",
                self.path.display()
            );
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<String> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let info = LockInfo {
        pid: std::process::id(),
        acquired_at: Utc::now(),
    };
    let token = serde_json::to_string(&info).map_err(std::io::Error::other)?;
    file.write_all(token.as_bytes())?;
    file.sync_all()?;
    Ok(token)
}

/// Current contents of an existing lock and its age: recorded acquisition
/// time, else file mtime.
fn read_lock(path: &Path) -> Option<(Vec<u8>, Duration)> {
    let contents = fs::read(path).ok()?;
    let recorded = serde_json::from_slice::<LockInfo>(&contents)
        .ok()
        .map(|info| info.acquired_at);

    let acquired_at = match recorded {
        Some(ts) => ts,
        None => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from)?,
    };
    let age = (Utc::now() - acquired_at).to_std().ok()?;
    Some((contents, age))
}

/// Remove the lock at `path` only if it still holds `expected`.
///
/// The lock is first renamed aside so the check and the removal act on the
/// same file. If it turns out to belong to someone else it is linked back
/// under its name, unless a newer lock already took that name.
fn remove_if_unchanged(path: &Path, expected: &[u8]) -> bool {
    let aside = path.with_file_name(format!(
        "{}.{}.{}.reclaim",
        LOCK_NAME,
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    if fs::rename(path, &aside).is_err() {
        return false;
    }

    let matches = fs::read(&aside)
        .map(|actual| actual == expected)
        .unwrap_or(false);
    if !matches {
        if let Err(e) = fs::hard_link(&aside, path) {
            warn!("Could not restore lock {}: {}", path.display(), e);
        }
    }
    let _ = fs::remove_file(&aside);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(250),
            stale_after: Duration::from_secs(600),
        }
    }

    #[test]
    fn acquire_creates_dir_and_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        let lock = ReportLock::acquire(&reports, quick()).unwrap();
        assert!(lock.path().exists());
        let info: LockInfo =
            serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn second_acquire_times_out_with_contention() {
        let dir = tempfile::tempdir().unwrap();
        let _held = ReportLock::acquire(dir.path(), quick()).unwrap();
        let second = ReportLock::acquire(dir.path(), quick());
        assert!(matches!(second, Err(MonitorError::LockContention(_))));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = ReportLock::acquire(dir.path(), quick()).unwrap();
        }
        assert!(!dir.path().join(LOCK_NAME).exists());
        assert!(ReportLock::acquire(dir.path(), quick()).is_ok());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let stale = LockInfo {
            pid: 1,
            acquired_at: Utc::now() - chrono::Duration::minutes(11),
        };
        fs::write(
            dir.path().join(LOCK_NAME),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = ReportLock::acquire(dir.path(), quick()).unwrap();
        let info: LockInfo =
            serde_json::from_str(&fs::read_to_string(lock.path()).unwrap()).unwrap();
        assert_eq!(info.pid, std::process::id());
    }

    #[test]
    fn unreadable_lock_falls_back_to_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_NAME);
        fs::write(&path, "garbage").unwrap();
        // Fresh mtime: still held.
        assert!(matches!(
            ReportLock::acquire(dir.path(), quick()),
            Err(MonitorError::LockContention(_))
        ));

        let old = std::time::SystemTime::now() - Duration::from_secs(3_600);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();
        assert!(ReportLock::acquire(dir.path(), quick()).is_ok());
    }

    #[test]
    fn reclaim_spares_a_lock_replaced_after_the_age_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_NAME);
        let stale = serde_json::to_string(&LockInfo {
            pid: 1,
            acquired_at: Utc::now() - chrono::Duration::minutes(11),
        })
        .unwrap();
        fs::write(&path, &stale).unwrap();
        let (observed, age) = read_lock(&path).unwrap();
        assert!(age > LockOptions::default().stale_after);

        // Another run reclaims first and writes its own fresh lock.
        fs::remove_file(&path).unwrap();
        let fresh = try_create(&path).unwrap();

        assert!(!remove_if_unchanged(&path, &observed));
        assert_eq!(fs::read_to_string(&path).unwrap(), fresh);
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn drop_leaves_a_lock_owned_by_someone_else() {
        let dir = tempfile::tempdir().unwrap();
        let lock = ReportLock::acquire(dir.path(), quick()).unwrap();
        let foreign = r#"{"pid":4242,"acquired_at":"2030-01-01T00:00:00Z"}"#;
        fs::write(lock.path(), foreign).unwrap();
        drop(lock);

        let path = dir.path().join(LOCK_NAME);
        assert_eq!(fs::read_to_string(&path).unwrap(), foreign);
    }
}
