// Lifecycle notifications published on the session event bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::FinalResult;
use crate::task::{FailureReason, ProgressSummary, Task};

/// Typed lifecycle event, published to external observers in program order:
/// `task_started -> content_chunk* -> (task_completed | error)` per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionInitialized {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        task_id: String,
        task: Task,
    },
    ContentChunk {
        task_id: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        task: Task,
    },
    Error {
        task_id: Option<String>,
        error: FailureReason,
        timestamp: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: String,
        final_results: FinalResult,
        summary: ProgressSummary,
    },
}
