// Aggregated result types
// Display-ready phases derived from a closed session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Phases
// ============================================================================

/// Classification of a design phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Analysis,
    Design,
    Implementation,
    Validation,
}

impl PhaseKind {
    /// Fixed display precedence; lower sorts first
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Analysis => 1,
            Self::Design => 2,
            Self::Implementation => 3,
            Self::Validation => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Design => "design",
            Self::Implementation => "implementation",
            Self::Validation => "validation",
        }
    }
}

/// A classified, cleaned, display-ready unit derived from one completed task.
/// Recomputed each time aggregation runs; never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Source task id
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PhaseKind,
    pub title: String,
    pub content: String,
    pub agent: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

// ============================================================================
// Final result
// ============================================================================

/// How a final result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Normal path: only completed tasks become phases
    Auto,
    /// Emergency path: partial content from still-active tasks is included
    Forced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// `max(ended_at) - min(started_at)` across completed tasks, in ms
    pub total_duration_ms: i64,
    /// Count of actually-completed tasks
    pub completed_count: usize,
    pub generated_at: DateTime<Utc>,
    pub mode: AggregationMode,
}

/// Immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub session_id: String,
    /// Ordered by phase precedence
    pub phases: Vec<Phase>,
    pub metadata: ResultMetadata,
}
