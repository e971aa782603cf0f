//! Checkpoints: opaque snapshots sufficient to restore a run at a node
//! boundary.
//!
//! The wire shape is a JSON object with `run_id`, `agent_id`,
//! `strategy_name`, `current_subgraph`, `current_node`, `current_input`,
//! `messages`, `feature_storage`, and `saved_at` (ISO-8601 UTC). Storage
//! backends implement [`CheckpointStorage`]; the in-memory implementation
//! here is the reference and test double; persistent backends live outside
//! this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::Message;

/// Snapshot of a run at a node boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    pub agent_id: String,
    pub strategy_name: String,
    pub current_subgraph: String,
    pub current_node: String,
    pub current_input: Value,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub feature_storage: Map<String, Value>,
    pub saved_at: DateTime<Utc>,
}

/// Error type for checkpoint storage operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<CheckpointError> for crate::error::AgentError {
    fn from(err: CheckpointError) -> Self {
        Self::Checkpoint(err.to_string())
    }
}

/// Storage collaborator the runner persists checkpoints through.
///
/// **Interaction**: the runner calls `put` on explicit `checkpoint()` and,
/// when auto-persistence is enabled, after every `after_node` hook.
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    async fn put(&self, run_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;
    /// Most recently written checkpoint across all runs.
    async fn latest(&self) -> Result<Option<Checkpoint>, CheckpointError>;
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError>;
}

#[derive(Default)]
struct InMemoryState {
    checkpoints: HashMap<String, Checkpoint>,
    /// Run ids in last-write order; the tail is `latest`.
    write_order: Vec<String>,
}

/// In-memory [`CheckpointStorage`].
#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    state: Mutex<InMemoryState>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStorage {
    async fn put(&self, run_id: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let mut state = self.state.lock().expect("checkpoint store lock");
        state.checkpoints.insert(run_id.to_string(), checkpoint.clone());
        state.write_order.retain(|id| id != run_id);
        state.write_order.push(run_id.to_string());
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let state = self.state.lock().expect("checkpoint store lock");
        Ok(state.checkpoints.get(run_id).cloned())
    }

    async fn latest(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let state = self.state.lock().expect("checkpoint store lock");
        Ok(state
            .write_order
            .last()
            .and_then(|id| state.checkpoints.get(id))
            .cloned())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        let state = self.state.lock().expect("checkpoint store lock");
        Ok(state.write_order.clone())
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        let mut state = self.state.lock().expect("checkpoint store lock");
        if state.checkpoints.remove(run_id).is_none() {
            return Err(CheckpointError::NotFound(run_id.to_string()));
        }
        state.write_order.retain(|id| id != run_id);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryCheckpointStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("checkpoint store lock");
        f.debug_struct("InMemoryCheckpointStorage")
            .field("runs", &state.write_order)
            .finish()
    }
}
