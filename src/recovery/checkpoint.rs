//! Checkpoints
//!
//! Progress records for multi-step operations, so an interrupted run can
//! resume at the first unfinished step.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Saved progress of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub operation_id: String,
    /// Steps finished so far; the next run starts at this index
    pub completed_steps: u32,
    /// Operation state after the last finished step
    pub state: Value,
    pub saved_at_ms: u64,
}

/// Storage for checkpoints, keyed by operation id.
pub trait CheckpointStore: Send + Sync + Debug {
    /// Returns the checkpoint for `operation_id`, if any.
    fn load(&self, operation_id: &str) -> Result<Option<Checkpoint>>;

    /// Stores `checkpoint`, replacing any earlier one for the same operation.
    fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Drops the checkpoint for `operation_id`. Returns true if one existed.
    fn clear(&self, operation_id: &str) -> Result<bool>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Arc<S> {
    fn load(&self, operation_id: &str) -> Result<Option<Checkpoint>> {
        (**self).load(operation_id)
    }

    fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        (**self).save(checkpoint)
    }

    fn clear(&self, operation_id: &str) -> Result<bool> {
        (**self).clear(operation_id)
    }
}

/// Process-lifetime checkpoint store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, operation_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation_id)
            .cloned())
    }

    fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(checkpoint.operation_id.clone(), checkpoint);
        Ok(())
    }

    fn clear(&self, operation_id: &str) -> Result<bool> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(operation_id)
            .is_some())
    }
}
