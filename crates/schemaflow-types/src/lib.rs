mod event;
mod result;
mod task;

pub use event::SessionEvent;
pub use result::{AggregationMode, FinalResult, Phase, PhaseKind, ResultMetadata};
pub use task::{
    DesignDomain, Diagnostics, DiagnosticsMetrics, FailureReason, ProgressSummary,
    SessionSnapshot, SessionStatus, Task, TaskStatus,
};
