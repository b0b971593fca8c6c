// Task and session records
// Core type definitions shared across the Schemaflow engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Tasks
// ============================================================================

/// Lifecycle state of a generation task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet streaming
    Pending,
    /// Currently receiving content
    Active,
    /// Finished successfully; content is frozen
    Completed,
    /// Failed or timed out; content is frozen
    Error,
}

/// Why a task was moved to [`TaskStatus::Error`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The per-task deadline elapsed while the task was still active
    TaskTimeout,
    /// The orphan sweep found the task stuck past twice the deadline
    OrphanedTask,
    /// The underlying generation call failed
    Generation { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskTimeout => write!(f, "task timed out"),
            Self::OrphanedTask => write!(f, "task orphaned"),
            Self::Generation { message } => write!(f, "generation failed: {}", message),
        }
    }
}

/// One unit of generation work, owned by the task registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique within a session
    pub id: String,
    /// Short display title
    pub title: String,
    /// Name of the agent producing this task's content
    pub agent: String,
    /// Current lifecycle state
    pub status: TaskStatus,
    /// Accumulated streamed content; append-only while active
    pub content: String,
    /// When streaming started
    pub started_at: DateTime<Utc>,
    /// Set exactly once, on transition out of `Active`
    pub ended_at: Option<DateTime<Utc>>,
    /// Failure reason if the task errored
    pub error: Option<FailureReason>,
}

impl Task {
    pub fn new(id: String, title: String, agent: String) -> Self {
        Self {
            id,
            title,
            agent,
            status: TaskStatus::Active,
            content: String::new(),
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }
}

// ============================================================================
// Session views
// ============================================================================

/// Read-only summary of the active session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub tasks: Vec<Task>,
    /// The single task currently streaming, if any
    pub active_task: Option<Task>,
    pub completed_count: usize,
    pub total_count: usize,
}

/// Immutable capture of a session's tasks, taken when the session closes
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub tasks: Vec<Task>,
    pub captured_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Count tasks by state for observers
    pub fn progress(&self) -> ProgressSummary {
        let mut progress = ProgressSummary::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::Active => progress.active += 1,
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Error => progress.failed += 1,
            }
        }
        progress.total = self.tasks.len();
        progress
    }
}

/// Task counts by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

// ============================================================================
// Design domains
// ============================================================================

/// Kind of data store a design request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignDomain {
    Relational,
    Document,
    Vector,
}

impl DesignDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Document => "document",
            Self::Vector => "vector",
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Pre-flight and per-attempt health of the generation path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub credential_valid: bool,
    pub network_connected: bool,
    pub service_responsive: bool,
    pub last_error: Option<String>,
    pub metrics: DiagnosticsMetrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticsMetrics {
    /// Duration of the most recent generation attempt
    pub response_time_ms: u64,
    /// Retries consumed so far
    pub retry_count: u32,
    /// Whether the fallback path has been entered
    pub fallback_triggered: bool,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            credential_valid: false,
            network_connected: false,
            service_responsive: false,
            last_error: None,
            metrics: DiagnosticsMetrics::default(),
        }
    }
}
