//! Lifecycle state of resource instances
//!
//! Every instance owns a small category → key → value store. The engine only
//! relies on `actions.install`, which is `"ok"` once the instance converged.
//! Stores persist the state together with the spec, so identifiers assigned by
//! the control plane survive a restart of the runtime.

use crate::error::{EngineError, Result};
use crate::kind::ResourceKind;
use crate::manifest::validate_name;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs;

pub const CATEGORY_ACTIONS: &str = "actions";
pub const KEY_INSTALL: &str = "install";
pub const VALUE_OK: &str = "ok";

const RECORD_VERSION: u32 = 1;
const RECORD_EXTENSION: &str = "json";
const BACKUP_EXTENSION: &str = "json.backup";

/// Persisted category → key → value store of one instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    #[serde(flatten)]
    categories: BTreeMap<String, BTreeMap<String, String>>,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: &str, key: &str) -> Option<&str> {
        self.categories
            .get(category)
            .and_then(|keys| keys.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, category: &str, key: &str, value: impl Into<String>) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn delete(&mut self, category: &str, key: &str) {
        if let Some(keys) = self.categories.get_mut(category) {
            keys.remove(key);
            if keys.is_empty() {
                self.categories.remove(category);
            }
        }
    }

    /// Fails unless `category.key` currently holds `value`
    pub fn check(&self, category: &str, key: &str, value: &str) -> Result<()> {
        match self.get(category, key) {
            Some(actual) if actual == value => Ok(()),
            actual => Err(EngineError::State(format!(
                "state check failed: {}.{} is {}, expected \"{}\"",
                category,
                key,
                actual
                    .map(|a| format!("\"{}\"", a))
                    .unwrap_or_else(|| "absent".to_string()),
                value
            ))),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.get(CATEGORY_ACTIONS, KEY_INSTALL) == Some(VALUE_OK)
    }

    pub fn mark_installed(&mut self) {
        self.set(CATEGORY_ACTIONS, KEY_INSTALL, VALUE_OK);
    }

    pub fn clear_installed(&mut self) {
        self.delete(CATEGORY_ACTIONS, KEY_INSTALL);
    }
}

/// Where an instance is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Uninstalled,
    Installing,
    Installed,
    Uninstalling,
}

impl LifecycleStatus {
    pub fn from_state(state: &LifecycleState) -> Self {
        if state.is_installed() {
            LifecycleStatus::Installed
        } else {
            LifecycleStatus::Uninstalled
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStatus::Uninstalled => write!(f, "uninstalled"),
            LifecycleStatus::Installing => write!(f, "installing"),
            LifecycleStatus::Installed => write!(f, "installed"),
            LifecycleStatus::Uninstalling => write!(f, "uninstalling"),
        }
    }
}

/// Everything persisted for one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    #[serde(default = "record_version")]
    pub version: u32,
    pub kind: ResourceKind,
    pub name: String,
    pub spec: serde_json::Value,
    pub state: LifecycleState,
    pub updated_at: DateTime<Utc>,
}

fn record_version() -> u32 {
    RECORD_VERSION
}

impl InstanceRecord {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        spec: serde_json::Value,
        state: LifecycleState,
    ) -> Self {
        Self {
            version: RECORD_VERSION,
            kind,
            name: name.into(),
            spec,
            state,
            updated_at: Utc::now(),
        }
    }
}

/// Persistence of instance records, provided by the runtime
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, kind: ResourceKind, name: &str) -> Result<Option<InstanceRecord>>;
    async fn save(&self, record: &InstanceRecord) -> Result<()>;
    async fn remove(&self, kind: ResourceKind, name: &str) -> Result<()>;
}

/// Store that keeps records for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<(ResourceKind, String), InstanceRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, kind: ResourceKind, name: &str) -> Result<Option<InstanceRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&(kind, name.to_string())).cloned())
    }

    async fn save(&self, record: &InstanceRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert((record.kind, record.name.clone()), record.clone());
        Ok(())
    }

    async fn remove(&self, kind: ResourceKind, name: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.remove(&(kind, name.to_string()));
        Ok(())
    }
}

/// Store writing one JSON file per instance under `<root>/<kind>/<name>.json`
///
/// The previous revision of a record is kept next to it as `.json.backup`.
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn kind_dir(&self, kind: ResourceKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn record_path(&self, kind: ResourceKind, name: &str) -> Result<PathBuf> {
        validate_name(kind, name)?;
        Ok(self
            .kind_dir(kind)
            .join(format!("{}.{}", name, RECORD_EXTENSION)))
    }

    fn backup_path(&self, kind: ResourceKind, name: &str) -> Result<PathBuf> {
        validate_name(kind, name)?;
        Ok(self
            .kind_dir(kind)
            .join(format!("{}.{}", name, BACKUP_EXTENSION)))
    }

    async fn ensure_kind_dir(&self, kind: ResourceKind) -> Result<()> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, kind: ResourceKind, name: &str) -> Result<Option<InstanceRecord>> {
        let path = self.record_path(kind, name)?;
        if !path.exists() {
            tracing::debug!(%kind, name, "No state record found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let record: InstanceRecord = serde_json::from_str(&content)?;

        if record.version > RECORD_VERSION {
            return Err(EngineError::Store(format!(
                "state record {} has version {}, newer than supported version {}",
                path.display(),
                record.version,
                RECORD_VERSION
            )));
        }

        Ok(Some(record))
    }

    async fn save(&self, record: &InstanceRecord) -> Result<()> {
        let path = self.record_path(record.kind, &record.name)?;
        let backup = self.backup_path(record.kind, &record.name)?;
        self.ensure_kind_dir(record.kind).await?;

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let content = serde_json::to_string_pretty(record)?;
        fs::write(&path, content).await?;

        tracing::debug!(kind = %record.kind, name = %record.name, "Saved state record");
        Ok(())
    }

    async fn remove(&self, kind: ResourceKind, name: &str) -> Result<()> {
        for path in [self.record_path(kind, name)?, self.backup_path(kind, name)?] {
            if path.exists() {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_install_flag() {
        let mut state = LifecycleState::new();
        assert!(!state.is_installed());
        assert!(state.check(CATEGORY_ACTIONS, KEY_INSTALL, VALUE_OK).is_err());

        state.mark_installed();
        assert!(state.is_installed());
        assert!(state.check(CATEGORY_ACTIONS, KEY_INSTALL, VALUE_OK).is_ok());

        state.clear_installed();
        assert!(!state.is_installed());
        assert_eq!(state, LifecycleState::new());
    }

    #[test]
    fn test_check_reports_actual_value() {
        let mut state = LifecycleState::new();
        state.set("actions", "install", "pending");

        let err = state.check("actions", "install", "ok").unwrap_err();
        assert!(err.to_string().contains("\"pending\""));
    }

    #[test]
    fn test_state_serializes_as_nested_map() {
        let mut state = LifecycleState::new();
        state.mark_installed();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({"actions": {"install": "ok"}}));
    }

    #[tokio::test]
    async fn test_file_store_save_load() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());

        let mut state = LifecycleState::new();
        state.mark_installed();
        let record = InstanceRecord::new(
            ResourceKind::Account,
            "acc1",
            serde_json::json!({"connection": "main", "accountID": 7}),
            state,
        );

        store.save(&record).await.unwrap();
        store.save(&record).await.unwrap();
        assert!(temp_dir.path().join("account/acc1.json.backup").exists());

        let loaded = store
            .load(ResourceKind::Account, "acc1")
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.state.is_installed());
        assert_eq!(loaded.spec["accountID"], 7);

        store.remove(ResourceKind::Account, "acc1").await.unwrap();
        assert!(store.load(ResourceKind::Account, "acc1").await.unwrap().is_none());
        assert!(!temp_dir.path().join("account/acc1.json.backup").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_newer_version() {
        let temp_dir = tempdir().unwrap();
        let store = FileStateStore::new(temp_dir.path());
        let mut record = InstanceRecord::new(
            ResourceKind::Disk,
            "d1",
            serde_json::json!({}),
            LifecycleState::new(),
        );
        record.version = RECORD_VERSION + 1;
        store.save(&record).await.unwrap();

        let err = store.load(ResourceKind::Disk, "d1").await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_names() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("state");
        let store = FileStateStore::new(&root);
        let record = InstanceRecord::new(
            ResourceKind::Account,
            "../escaped",
            serde_json::json!({}),
            LifecycleState::new(),
        );

        let err = store.save(&record).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(!temp_dir.path().join("escaped.json").exists());
        assert!(!root.exists());
        assert!(store.load(ResourceKind::Account, "a/b").await.is_err());
        assert!(store.remove(ResourceKind::Account, "..").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty());
        let record = InstanceRecord::new(
            ResourceKind::Identity,
            "alice",
            serde_json::json!({}),
            LifecycleState::new(),
        );
        store.save(&record).await.unwrap();
        assert_eq!(store.len(), 1);
        store.remove(ResourceKind::Identity, "alice").await.unwrap();
        assert!(store.is_empty());
    }
}
