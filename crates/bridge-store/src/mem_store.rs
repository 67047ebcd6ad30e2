use crate::{SnapshotKey, SnapshotStore, StoreResult};
use bridge_protocol::Snapshot;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// In-memory store for tests and hosts without durable storage.
#[derive(Clone, Default)]
pub struct MemSnapshotStore {
    entries: Arc<RwLock<HashMap<SnapshotKey, Snapshot>>>,
}

impl std::fmt::Debug for MemSnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemSnapshotStore")
            .field("entries", &self.entries.read().unwrap().len())
            .finish()
    }
}

impl MemSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemSnapshotStore {
    fn get(&self, key: &SnapshotKey) -> StoreResult<Option<Snapshot>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &SnapshotKey, snapshot: &Snapshot) -> StoreResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.clone(), snapshot.clone());
        Ok(())
    }

    fn invalidate(&self, key: &SnapshotKey) -> StoreResult<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}
