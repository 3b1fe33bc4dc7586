//! Cross-process advisory locks keyed by app name.
//!
//! A lock is a file `locks/{name}.lock` created with `O_EXCL` and holding
//! the owner's pid. Contenders poll until the file can be created or the
//! deadline passes. A lock whose recorded pid no longer exists is stale and
//! is reclaimed, as is a file that stayed empty for longer than
//! [`UNWRITTEN_LOCK_GRACE`] (its creator died before writing the pid).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};

/// Timeout for deploy, rollback, and scale.
pub const INTERACTIVE_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for publish, link, and volume operations.
pub const LONG_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a lock file may exist without a pid before it counts as stale.
pub const UNWRITTEN_LOCK_GRACE: Duration = Duration::from_secs(5);

/// Hands out per-name lock files inside a directory.
#[derive(Debug, Clone)]
pub struct LockManager {
    dir: PathBuf,
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.lock"))
    }

    /// Acquire the lock for `name`, polling until `timeout` elapses.
    ///
    /// Returns [`StateError::Busy`] if another live process holds it.
    pub async fn try_lock(&self, name: &str, timeout: Duration) -> StateResult<LockGuard> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StateError::io(&self.dir, e))?;
        let path = self.path_for(name);
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())
                        .map_err(|e| StateError::io(&path, e))?;
                    debug!(lock = %name, "lock acquired");
                    return Ok(LockGuard { path: Some(path) });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Some(pid) = stale_holder(&path) {
                        warn!(lock = %name, pid = ?pid, "removing stale lock");
                        if std::fs::remove_file(&path).is_ok() {
                            continue;
                        }
                    }
                }
                Err(e) => return Err(StateError::io(&path, e)),
            }

            if Instant::now() >= deadline {
                return Err(StateError::Busy(name.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Remove the lock file for `name` regardless of owner.
    pub fn unlock(&self, name: &str) -> StateResult<()> {
        let path = self.path_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::io(&path, e)),
        }
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Lock files whose holder is gone, as `(name, pid)`. The pid is `None`
    /// for a file its creator never wrote.
    pub fn stale_locks(&self) -> StateResult<Vec<(String, Option<u32>)>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::io(&self.dir, e)),
        };
        let mut stale = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StateError::io(&self.dir, e))?.path();
            let Some(name) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".lock"))
            else {
                continue;
            };
            if let Some(pid) = stale_holder(&path) {
                stale.push((name.to_string(), pid));
            }
        }
        stale.sort();
        Ok(stale)
    }
}

/// Held lock; the file is removed on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: Option<PathBuf>,
}

impl LockGuard {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Release explicitly, surfacing any removal error.
    pub fn release(mut self) -> StateResult<()> {
        match self.path.take() {
            Some(path) => std::fs::remove_file(&path).map_err(|e| StateError::io(&path, e)),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = ?path, error = %e, "failed to release lock");
            }
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// `Some(pid)` if the lock at `path` is stale. A file without a readable
/// pid is fresh while younger than [`UNWRITTEN_LOCK_GRACE`], then stale
/// with pid `None`.
fn stale_holder(path: &Path) -> Option<Option<u32>> {
    if let Some(pid) = read_pid(path) {
        return (!process_alive(pid)).then_some(Some(pid));
    }
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let age = SystemTime::now().duration_since(modified).unwrap_or_default();
    (age > UNWRITTEN_LOCK_GRACE).then_some(None)
}

/// Zero-signal liveness check. `EPERM` means the process exists but belongs
/// to someone else.
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill with signal 0 performs only the permission and existence
    // checks; no signal is delivered.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockManager::new(dir.path());

        let guard = locks.try_lock("web", Duration::from_millis(200)).await.unwrap();
        assert!(locks.is_locked("web"));
        let contents = std::fs::read_to_string(guard.path().unwrap()).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));

        drop(guard);
        assert!(!locks.is_locked("web"));
    }

    #[tokio::test]
    async fn second_holder_gets_busy() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockManager::new(dir.path());
        let _held = locks.try_lock("web", Duration::from_millis(200)).await.unwrap();

        let started = std::time::Instant::now();
        let err = locks
            .try_lock("web", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Busy(_)));
        assert_eq!(err.to_string(), "another operation in progress for web");
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn disjoint_names_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockManager::new(dir.path());
        let _web = locks.try_lock("web", Duration::from_millis(100)).await.unwrap();
        let _api = locks.try_lock("api", Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockManager::new(dir.path());
        // pid_max on Linux is at most 2^22, so this pid cannot exist.
        std::fs::write(dir.path().join("web.lock"), "99999999\n").unwrap();

        assert_eq!(locks.stale_locks().unwrap(), vec![("web".to_string(), Some(99_999_999))]);
        let guard = locks.try_lock("web", Duration::from_millis(200)).await.unwrap();
        guard.release().unwrap();
        assert!(!locks.is_locked("web"));
    }

    #[tokio::test]
    async fn unreadable_pid_waits_for_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockManager::new(dir.path());
        std::fs::write(dir.path().join("web.lock"), "").unwrap();

        let err = locks
            .try_lock("web", Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Busy(_)));
        assert!(locks.stale_locks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn abandoned_empty_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let locks = LockManager::new(dir.path());
        let path = dir.path().join("web.lock");
        let file = std::fs::File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - UNWRITTEN_LOCK_GRACE * 2).unwrap();
        drop(file);

        assert_eq!(locks.stale_locks().unwrap(), vec![("web".to_string(), None)]);
        let guard = locks.try_lock("web", Duration::from_millis(200)).await.unwrap();
        let contents = std::fs::read_to_string(guard.path().unwrap()).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));
    }

    #[test]
    fn unlock_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        LockManager::new(dir.path()).unlock("ghost").unwrap();
    }

    #[test]
    fn own_process_is_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(0));
    }
}
