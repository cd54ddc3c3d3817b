//! Checkpointing: a durable (at least in-process) record of every
//! operation successfully executed so far, used to drive rollback.

use crate::error::{Error, Result};
use crate::operation::{Operation, OperationId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointId(pub String);

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub created_at: DateTime<Utc>,
    pub entries: HashMap<OperationId, Operation>,
}

impl Checkpoint {
    fn new(id: CheckpointId) -> Self {
        Self { id, created_at: Utc::now(), entries: HashMap::new() }
    }
}

pub trait CheckpointStore: Send + Sync {
    fn create(&self) -> Result<Checkpoint>;
    fn record(&self, id: &CheckpointId, op: Operation) -> Result<()>;
    fn restore(&self, id: &CheckpointId) -> Result<Checkpoint>;
    fn delete(&self, id: &CheckpointId) -> Result<()>;
}

/// The authoritative checkpoint implementation: process-local, in-memory.
/// A persistent backing may be layered in front of this one (e.g. flushing
/// each `record` to disk) without changing this contract.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<CheckpointId, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn create(&self) -> Result<Checkpoint> {
        let id = CheckpointId(uuid::Uuid::new_v4().to_string());
        let checkpoint = Checkpoint::new(id.clone());
        self.checkpoints.lock().unwrap().insert(id, checkpoint.clone());
        Ok(checkpoint)
    }

    fn record(&self, id: &CheckpointId, op: Operation) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock().unwrap();
        let checkpoint = checkpoints
            .get_mut(id)
            .ok_or_else(|| Error::CheckpointNotFound { id: id.0.clone() })?;
        checkpoint.entries.insert(op.id().clone(), op);
        Ok(())
    }

    fn restore(&self, id: &CheckpointId) -> Result<Checkpoint> {
        self.checkpoints
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::CheckpointNotFound { id: id.0.clone() })
    }

    fn delete(&self, id: &CheckpointId) -> Result<()> {
        self.checkpoints
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::CheckpointNotFound { id: id.0.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;
    use crate::path::FilePath;

    #[test]
    fn restore_unknown_checkpoint_fails() {
        let store = InMemoryCheckpointStore::new();
        let err = store.restore(&CheckpointId("ghost".to_string())).unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound { .. }));
    }

    #[test]
    fn record_accumulates_entries() {
        let store = InMemoryCheckpointStore::new();
        let checkpoint = store.create().unwrap();
        let op = Operation::new(
            OperationId::new("1"),
            OperationKind::FileDelete { path: FilePath::new("/a").unwrap() },
        );
        store.record(&checkpoint.id, op).unwrap();
        let restored = store.restore(&checkpoint.id).unwrap();
        assert_eq!(restored.entries.len(), 1);
    }
}
