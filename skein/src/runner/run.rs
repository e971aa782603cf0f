//! Run records: one invocation of an agent from input to terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a run. Transitions `Pending -> Running` on the first
/// hook and `Running -> {Completed, Failed, Cancelled}` exactly once; a run
/// is never restarted (restore produces a new run id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Bookkeeping record the runner keeps per run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub strategy_name: String,
    pub agent_id: String,
    /// Node the interpreter is positioned at, while the run is live.
    pub current_node: Option<String>,
    pub iterations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

impl Run {
    pub(crate) fn new(
        id: impl Into<String>,
        strategy_name: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            strategy_name: strategy_name.into(),
            agent_id: agent_id.into(),
            current_node: None,
            iterations: 0,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Pending,
        }
    }

    /// Applies a status transition; terminal status is written exactly once
    /// and later transitions are ignored.
    pub(crate) fn transition(&mut self, status: RunStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        if status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }
}
