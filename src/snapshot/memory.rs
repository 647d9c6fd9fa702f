// src/snapshot/memory.rs
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Snapshot, SnapshotAck, SnapshotSink, StorageError};

/// In-process snapshot log. Used by tests and `STORAGE_BACKEND=memory`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<Vec<Snapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything appended so far, oldest first.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SnapshotSink for MemorySnapshotStore {
    async fn append(&self, snapshot: &Snapshot) -> Result<SnapshotAck, StorageError> {
        let mut v = self
            .inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store poisoned".into()))?;
        v.push(snapshot.clone());
        Ok(SnapshotAck { id: v.len() as i64 })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
