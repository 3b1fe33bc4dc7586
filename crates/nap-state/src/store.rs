//! Registry: one JSON file per entity kind.
//!
//! Every write serializes the whole collection and replaces the file through
//! [`nap_core::write_atomic`], so a concurrent reader sees either the
//! previous or the next collection. A per-registry mutex serializes
//! read-modify-write cycles within the process; cross-process exclusion is
//! the job of [`crate::LockManager`].

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use nap_core::{StateDir, write_atomic};

use crate::error::{StateError, StateResult};
use crate::tables::{self, Table};
use crate::types::*;

/// An entity stored in a registry file.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const TABLE: Table;

    /// Unique lookup key (the name for most kinds).
    fn key(&self) -> &str;

    /// Stable identity used by [`Registry::update`].
    fn id(&self) -> &str;
}

impl Record for Application {
    const TABLE: Table = tables::APPLICATIONS;
    fn key(&self) -> &str {
        &self.name
    }
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Database {
    const TABLE: Table = tables::DATABASES;
    fn key(&self) -> &str {
        &self.name
    }
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Vpc {
    const TABLE: Table = tables::VPCS;
    fn key(&self) -> &str {
        &self.name
    }
    fn id(&self) -> &str {
        &self.name
    }
}

impl Record for VolumeBackup {
    const TABLE: Table = tables::VOLUME_BACKUPS;
    fn key(&self) -> &str {
        &self.id
    }
    fn id(&self) -> &str {
        &self.id
    }
}

/// Typed access to one registry file.
pub struct Registry<T: Record> {
    path: PathBuf,
    guard: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> Registry<T> {
    /// Registry for `T` under the given state directory.
    pub fn open(dir: &StateDir) -> Self {
        Self::at(dir.root().join(T::TABLE.file))
    }

    /// Registry backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no torn state.
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the file with an empty collection if it does not exist.
    pub fn initialize(&self) -> StateResult<()> {
        let _held = self.lock();
        if self.path.exists() {
            return Ok(());
        }
        self.write(&[])?;
        debug!(path = ?self.path, "registry initialized");
        Ok(())
    }

    pub fn list(&self) -> StateResult<Vec<T>> {
        let _held = self.lock();
        self.read()
    }

    pub fn find(&self, key: &str) -> StateResult<Option<T>> {
        Ok(self.list()?.into_iter().find(|r| r.key() == key))
    }

    pub fn get(&self, key: &str) -> StateResult<T> {
        self.find(key)?.ok_or_else(|| not_found::<T>(key))
    }

    pub fn get_by_id(&self, id: &str) -> StateResult<T> {
        self.list()?
            .into_iter()
            .find(|r| r.id() == id)
            .ok_or_else(|| not_found::<T>(id))
    }

    pub fn exists(&self, key: &str) -> StateResult<bool> {
        Ok(self.find(key)?.is_some())
    }

    /// Insert a new record; fails on a key collision.
    pub fn add(&self, record: T) -> StateResult<()> {
        let _held = self.lock();
        let mut records = self.read()?;
        if records.iter().any(|r| r.key() == record.key()) {
            return Err(StateError::Conflict {
                kind: T::TABLE.kind,
                name: record.key().to_string(),
            });
        }
        debug!(kind = T::TABLE.kind, key = %record.key(), "record added");
        records.push(record);
        self.write(&records)
    }

    /// Replace the record with the same id; fails if it is absent.
    pub fn update(&self, record: &T) -> StateResult<()> {
        let _held = self.lock();
        let mut records = self.read()?;
        let slot = records
            .iter_mut()
            .find(|r| r.id() == record.id())
            .ok_or_else(|| not_found::<T>(record.key()))?;
        *slot = record.clone();
        debug!(kind = T::TABLE.kind, key = %record.key(), "record updated");
        self.write(&records)
    }

    pub fn delete(&self, key: &str) -> StateResult<()> {
        let _held = self.lock();
        let mut records = self.read()?;
        let before = records.len();
        records.retain(|r| r.key() != key);
        if records.len() == before {
            return Err(not_found::<T>(key));
        }
        debug!(kind = T::TABLE.kind, %key, "record deleted");
        self.write(&records)
    }

    fn read(&self) -> StateResult<Vec<T>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::io(&self.path, e)),
        };
        let corrupt = |source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        };
        let mut doc: serde_json::Value = serde_json::from_slice(&bytes).map_err(corrupt)?;
        match doc.get_mut(T::TABLE.root).map(serde_json::Value::take) {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(items) => serde_json::from_value(items).map_err(corrupt),
        }
    }

    fn write(&self, records: &[T]) -> StateResult<()> {
        let mut doc = serde_json::Map::new();
        doc.insert(T::TABLE.root.to_string(), serde_json::to_value(records)?);
        let bytes = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}

fn not_found<T: Record>(key: &str) -> StateError {
    StateError::NotFound {
        kind: T::TABLE.kind,
        name: key.to_string(),
    }
}

/// Handles to every registry, opened together at command entry.
pub struct Registries {
    pub apps: Registry<Application>,
    pub databases: Registry<Database>,
    pub vpcs: Registry<Vpc>,
    pub volume_backups: Registry<VolumeBackup>,
}

impl Registries {
    /// Open and initialize every registry under `dir`.
    pub fn open(dir: &StateDir) -> StateResult<Self> {
        dir.ensure()?;
        let registries = Self {
            apps: Registry::open(dir),
            databases: Registry::open(dir),
            vpcs: Registry::open(dir),
            volume_backups: Registry::open(dir),
        };
        registries.apps.initialize()?;
        registries.databases.initialize()?;
        registries.vpcs.initialize()?;
        registries.volume_backups.initialize()?;
        Ok(registries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_app(name: &str) -> Application {
        Application::new(format!("app-{name}"), name, "primary", Utc::now())
    }

    fn open_apps(dir: &tempfile::TempDir) -> Registry<Application> {
        Registry::open(&StateDir::new(dir.path()))
    }

    // ── CRUD ───────────────────────────────────────────────────────

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let apps = open_apps(&dir);
        assert!(apps.list().unwrap().is_empty());
        assert!(!apps.exists("web").unwrap());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let apps = open_apps(&dir);
        apps.initialize().unwrap();
        apps.add(test_app("web")).unwrap();
        apps.initialize().unwrap();
        assert_eq!(apps.list().unwrap().len(), 1);
        let raw = std::fs::read_to_string(apps.path()).unwrap();
        assert!(raw.starts_with("{\n  \"applications\": ["));
    }

    #[test]
    fn add_get_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let apps = open_apps(&dir);
        apps.add(test_app("web")).unwrap();

        let mut web = apps.get("web").unwrap();
        assert_eq!(apps.get_by_id("app-web").unwrap().name, "web");

        web.instances = 3;
        apps.update(&web).unwrap();
        assert_eq!(apps.get("web").unwrap().instances, 3);

        apps.delete("web").unwrap();
        assert!(matches!(apps.get("web"), Err(StateError::NotFound { .. })));
    }

    #[test]
    fn add_rejects_name_collision() {
        let dir = tempfile::tempdir().unwrap();
        let apps = open_apps(&dir);
        apps.add(test_app("web")).unwrap();
        let err = apps.add(test_app("web")).unwrap_err();
        assert!(matches!(err, StateError::Conflict { .. }));
        assert_eq!(err.to_string(), "application 'web' already exists");
    }

    #[test]
    fn update_and_delete_require_presence() {
        let dir = tempfile::tempdir().unwrap();
        let apps = open_apps(&dir);
        assert!(matches!(
            apps.update(&test_app("ghost")),
            Err(StateError::NotFound { .. })
        ));
        assert!(matches!(apps.delete("ghost"), Err(StateError::NotFound { .. })));
    }

    // ── File format ────────────────────────────────────────────────

    #[test]
    fn malformed_json_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let apps = open_apps(&dir);
        std::fs::write(apps.path(), b"{\"applications\": [").unwrap();
        let err = apps.list().unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
        assert_eq!(err.kind(), nap_core::ErrorKind::Io);
    }

    #[test]
    fn null_collection_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vpcs: Registry<Vpc> = Registry::open(&StateDir::new(dir.path()));
        std::fs::write(vpcs.path(), b"{\"vpcs\": null}").unwrap();
        assert!(vpcs.list().unwrap().is_empty());
    }

    #[test]
    fn rewrite_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let apps = open_apps(&dir);
        let mut app = test_app("web");
        app.env_vars.insert("B".into(), "2".into());
        app.env_vars.insert("A".into(), "1".into());
        app.record_deployment("img:1", Utc::now());
        apps.add(app).unwrap();

        let first = std::fs::read(apps.path()).unwrap();
        let reread = apps.get("web").unwrap();
        apps.update(&reread).unwrap();
        assert_eq!(std::fs::read(apps.path()).unwrap(), first);
    }

    #[test]
    fn nested_table_paths_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let registries = Registries::open(&StateDir::new(dir.path())).unwrap();
        assert!(registries.volume_backups.path().is_file());
        assert!(registries.volume_backups.list().unwrap().is_empty());
    }
}
