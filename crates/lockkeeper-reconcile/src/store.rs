//! Persistence for [`PersistedSecurityState`]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::state::{EntityRef, PersistedSecurityState};
use crate::{Error, Result};

#[async_trait]
pub trait SecurityStateStore: Send + Sync {
    async fn load(&self, entity: &EntityRef) -> Result<Option<PersistedSecurityState>>;

    async fn save(&self, entity: &EntityRef, state: &PersistedSecurityState) -> Result<()>;

    async fn list(&self) -> Result<Vec<(EntityRef, PersistedSecurityState)>>;
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    states: RwLock<BTreeMap<EntityRef, PersistedSecurityState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecurityStateStore for MemoryStore {
    async fn load(&self, entity: &EntityRef) -> Result<Option<PersistedSecurityState>> {
        let states = self
            .states
            .read()
            .map_err(|_| Error::Storage("memory store poisoned".into()))?;
        Ok(states.get(entity).cloned())
    }

    async fn save(&self, entity: &EntityRef, state: &PersistedSecurityState) -> Result<()> {
        let mut states = self
            .states
            .write()
            .map_err(|_| Error::Storage("memory store poisoned".into()))?;
        states.insert(entity.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(EntityRef, PersistedSecurityState)>> {
        let states = self
            .states
            .read()
            .map_err(|_| Error::Storage("memory store poisoned".into()))?;
        Ok(states.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// One JSON document keyed by `kind:id`
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<data dir>/lockkeeper/security-state.json`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lockkeeper")
            .join("security-state.json")
    }

    pub fn default_location() -> Self {
        Self::new(Self::default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<String, PersistedSecurityState>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SecurityStateStore for JsonFileStore {
    async fn load(&self, entity: &EntityRef) -> Result<Option<PersistedSecurityState>> {
        Ok(self.read_document().await?.remove(&entity.to_string()))
    }

    async fn save(&self, entity: &EntityRef, state: &PersistedSecurityState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(entity.to_string(), state.clone());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write then rename so readers never see a partial document
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&document)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(entity = %entity, path = %self.path.display(), "Security state saved");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(EntityRef, PersistedSecurityState)>> {
        self.read_document()
            .await?
            .into_iter()
            .map(|(key, state)| key.parse::<EntityRef>().map(|entity| (entity, state)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityKind;
    use alloy_primitives::Address;

    fn secured() -> PersistedSecurityState {
        PersistedSecurityState {
            lock_address: Some(Address::repeat_byte(7)),
            lock_manager_granted: true,
            max_keys_secured: true,
            transferability_secured: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        let entity = EntityRef::new(EntityKind::Quest, "q1");
        assert!(store.load(&entity).await.unwrap().is_none());

        store.save(&entity, &secured()).await.unwrap();
        assert_eq!(store.load(&entity).await.unwrap(), Some(secured()));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let cohort = EntityRef::new(EntityKind::Cohort, "c-1");
        let milestone = EntityRef::new(EntityKind::Milestone, "m-9");

        let store = JsonFileStore::new(&path);
        assert!(store.load(&cohort).await.unwrap().is_none());
        store.save(&cohort, &secured()).await.unwrap();
        store
            .save(&milestone, &PersistedSecurityState::default())
            .await
            .unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.load(&cohort).await.unwrap(), Some(secured()));
        let all = reopened.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|(e, _)| *e == milestone));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["cohort:c-1"]["max_keys_secured"], true);
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        let err = store
            .load(&EntityRef::new(EntityKind::Quest, "q"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Serde(_)));
    }
}
