//! Layout of the controller-private state directory (`~/.nap`).

use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Environment variable overriding the state directory root.
pub const HOME_ENV: &str = "NAP_HOME";

/// Root of the on-disk controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$NAP_HOME` if set, otherwise `~/.nap`.
    pub fn discover() -> CoreResult<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }
        let home = dirs_next::home_dir().ok_or(CoreError::NoHome)?;
        Ok(Self::new(home.join(".nap")))
    }

    /// Create the root and the lock directory if missing.
    pub fn ensure(&self) -> CoreResult<()> {
        for dir in [self.root.clone(), self.locks_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn traefik_config(&self) -> PathBuf {
        self.root.join("traefik.yml")
    }

    pub fn letsencrypt_dir(&self) -> PathBuf {
        self.root.join("letsencrypt")
    }

    pub fn volume_backups_dir(&self) -> PathBuf {
        self.root.join("volume-backups")
    }
}
